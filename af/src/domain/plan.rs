//! Executable plans

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use planstore::{PlanStep, RiskLevel, SavedPlan};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::AgentRole;

/// Words that mark a task as complex
const COMPLEXITY_KEYWORDS: &[&str] = &[
    "refactor",
    "architecture",
    "migrate",
    "redesign",
    "multiple",
    "entire",
    "across",
    "system",
    "integrate",
    "overhaul",
];

/// Tasks longer than this are complex regardless of wording
const COMPLEX_TASK_LEN: usize = 100;

/// One unit of work assigned to an agent role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique within the plan
    pub id: String,
    pub description: String,
    pub agent_role: AgentRole,
    /// Earlier steps whose output this step reads
    #[serde(default)]
    pub context_step_ids: Vec<String>,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub can_run_in_parallel: bool,
    #[serde(default)]
    pub requires_approval: bool,
}

impl Step {
    pub fn new(id: impl Into<String>, role: AgentRole, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent_role: role,
            context_step_ids: Vec::new(),
            expected_output: String::new(),
            can_run_in_parallel: false,
            requires_approval: false,
        }
    }

    pub fn with_context(mut self, ids: &[&str]) -> Self {
        self.context_step_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = expected.into();
        self
    }

    pub fn with_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }

    pub fn parallel(mut self, can_run_in_parallel: bool) -> Self {
        self.can_run_in_parallel = can_run_in_parallel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Complex,
}

impl Complexity {
    /// Classify a task description
    pub fn classify(task: &str) -> Self {
        let text = task.to_lowercase();
        if task.chars().count() > COMPLEX_TASK_LEN || COMPLEXITY_KEYWORDS.iter().any(|k| text.contains(k)) {
            Self::Complex
        } else {
            Self::Simple
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

/// How much of the workspace a plan may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[default]
    Low,
    Medium,
    High,
}

impl Impact {
    /// High with a write-capable step and three or more steps, Medium with
    /// any write-capable step, else Low
    pub fn estimate(steps: &[Step]) -> Self {
        let writes = steps.iter().any(|s| s.agent_role.is_write_capable());
        match (writes, steps.len()) {
            (true, n) if n >= 3 => Self::High,
            (true, _) => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Structural problems that make a plan unexecutable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("Plan has no steps")]
    Empty,

    #[error("Duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("Step '{step_id}' depends on itself")]
    SelfReference { step_id: String },

    #[error("Step '{step_id}' depends on later step '{reference}'")]
    ForwardReference { step_id: String, reference: String },

    #[error("Step '{step_id}' depends on unknown step '{reference}'")]
    UnknownReference { step_id: String, reference: String },
}

/// An ordered, executable plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub plan_id: String,
    pub steps: Vec<Step>,
    pub original_task: String,
    pub complexity: Complexity,
    pub created_at: DateTime<Utc>,
    pub estimated_impact: Impact,
}

impl TaskPlan {
    /// Build a plan, deriving complexity from the task and impact from the steps
    pub fn new(task: impl Into<String>, steps: Vec<Step>) -> Self {
        let original_task = task.into();
        debug!(%original_task, step_count = steps.len(), "TaskPlan::new: called");
        Self {
            plan_id: planstore::generate_id("task", &original_task),
            complexity: Complexity::classify(&original_task),
            estimated_impact: Impact::estimate(&steps),
            steps,
            original_task,
            created_at: planstore::now(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Check id uniqueness and that every context reference points strictly backwards
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        debug!(plan_id = %self.plan_id, "TaskPlan::validate: called");
        if self.steps.is_empty() {
            return Err(PlanValidationError::Empty);
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.id.as_str(), i).is_some() {
                return Err(PlanValidationError::DuplicateStepId(step.id.clone()));
            }
        }

        for (i, step) in self.steps.iter().enumerate() {
            for reference in &step.context_step_ids {
                match index.get(reference.as_str()) {
                    Some(&j) if j == i => {
                        return Err(PlanValidationError::SelfReference {
                            step_id: step.id.clone(),
                        });
                    }
                    Some(&j) if j > i => {
                        return Err(PlanValidationError::ForwardReference {
                            step_id: step.id.clone(),
                            reference: reference.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        return Err(PlanValidationError::UnknownReference {
                            step_id: step.id.clone(),
                            reference: reference.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Convert a persisted plan into an executable one
    ///
    /// The plan id is kept. Roles come from each step's `agentRole` hint or are
    /// inferred from the description. Dependencies that do not point at an
    /// earlier step are dropped.
    pub fn from_saved(saved: &SavedPlan) -> Self {
        debug!(plan_id = %saved.plan_id, "TaskPlan::from_saved: called");
        let mut seen: Vec<&str> = Vec::new();
        let mut steps = Vec::with_capacity(saved.steps.len());

        for ps in &saved.steps {
            let role = ps
                .agent_role
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or_else(|| AgentRole::infer(&ps.description));

            let context_step_ids = ps
                .dependencies
                .iter()
                .filter(|dep| {
                    let ok = seen.contains(&dep.as_str());
                    if !ok {
                        warn!(step_id = %ps.step_id, dependency = %dep, "Dropping dependency that is not an earlier step");
                    }
                    ok
                })
                .cloned()
                .collect();

            let expected_output = if ps.expected_files.is_empty() {
                String::new()
            } else {
                format!("Changes to: {}", ps.expected_files.join(", "))
            };

            steps.push(Step {
                id: ps.step_id.clone(),
                description: ps.description.clone(),
                agent_role: role,
                context_step_ids,
                expected_output,
                can_run_in_parallel: !role.is_write_capable() && ps.risk_level == RiskLevel::Safe,
                requires_approval: role.is_write_capable() || ps.risk_level == RiskLevel::Risky,
            });
            seen.push(ps.step_id.as_str());
        }

        let original_task = if saved.summary.is_empty() {
            saved.title.clone()
        } else {
            format!("{}\n\n{}", saved.title, saved.summary)
        };

        Self {
            plan_id: saved.plan_id.clone(),
            complexity: Complexity::classify(&original_task),
            estimated_impact: Impact::estimate(&steps),
            steps,
            original_task,
            created_at: saved.created_at,
        }
    }

    /// Convert into the persisted, editable shape
    pub fn to_saved(&self) -> SavedPlan {
        let title = self.original_task.lines().next().unwrap_or_default().trim();
        let title: String = title.chars().take(80).collect();
        let steps = self
            .steps
            .iter()
            .map(|s| PlanStep {
                step_id: s.id.clone(),
                description: s.description.clone(),
                tools_to_use: Vec::new(),
                expected_files: Vec::new(),
                dependencies: s.context_step_ids.clone(),
                risk_level: if s.requires_approval {
                    RiskLevel::Moderate
                } else {
                    RiskLevel::Safe
                },
                agent_role: Some(s.agent_role.to_string()),
            })
            .collect();

        let mut saved = SavedPlan::new(title, self.original_task.clone())
            .with_steps(steps)
            .with_plan_type("task")
            .with_tags(vec![self.complexity.to_string()]);
        saved.plan_id = self.plan_id.clone();
        saved.created_at = self.created_at;
        saved
    }
}
