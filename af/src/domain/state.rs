//! Execution state and the resumable execution record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{StepOutput, TaskPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Planning,
    Reviewing,
    Executing,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Executing => write!(f, "executing"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStep {
    pub step_id: String,
    pub error: String,
    #[serde(default)]
    pub retry_count: u32,
}

/// Progress of one in-flight execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub plan_id: String,
    pub current_step_index: usize,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub failed_steps: Vec<FailedStep>,
    pub status: ExecutionStatus,
}

impl ExecutionState {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            current_step_index: 0,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            status: ExecutionStatus::Planning,
        }
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step_id)
    }

    pub fn failure(&self, step_id: &str) -> Option<&FailedStep> {
        self.failed_steps.iter().find(|f| f.step_id == step_id)
    }

    /// Record a success, clearing any earlier failure of the same step
    pub fn mark_completed(&mut self, step_id: &str) {
        self.failed_steps.retain(|f| f.step_id != step_id);
        if !self.is_completed(step_id) {
            self.completed_steps.push(step_id.to_string());
        }
    }

    /// Record a failure; a repeat failure bumps the retry count
    pub fn mark_failed(&mut self, step_id: &str, error: impl Into<String>) {
        let error = error.into();
        match self.failed_steps.iter_mut().find(|f| f.step_id == step_id) {
            Some(existing) => {
                existing.error = error;
                existing.retry_count += 1;
            }
            None => self.failed_steps.push(FailedStep {
                step_id: step_id.to_string(),
                error,
                retry_count: 0,
            }),
        }
    }

    /// Completed when nothing failed, else Failed
    pub fn finish(&mut self) {
        self.status = if self.failed_steps.is_empty() {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
    }
}

/// Everything needed to resume an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub plan: TaskPlan,
    pub state: ExecutionState,
    #[serde(default)]
    pub outputs: Vec<StepOutput>,
    #[serde(default = "planstore::now")]
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(plan: TaskPlan, state: ExecutionState, outputs: Vec<StepOutput>) -> Self {
        Self {
            plan,
            state,
            outputs,
            updated_at: planstore::now(),
        }
    }
}
