//! Keyword-driven planner

use async_trait::async_trait;
use tracing::{debug, info};

use super::{PlannerError, TaskPlanner};
use crate::agents::WorkspaceContext;
use crate::domain::{AgentRole, Step, TaskPlan};

/// Plan shapes the rule table can pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// researcher, documenter
    Explain,
    /// researcher, tester
    Test,
    /// researcher, developer, reviewer
    Change,
}

/// Ordered rules; first match wins, no match falls back to `Shape::Change`
const RULES: &[(&[&str], Shape)] = &[
    (&["explain", "what", "how"], Shape::Explain),
    (&["test", "spec"], Shape::Test),
    (&["fix", "bug"], Shape::Change),
];

/// Plans by case-insensitive keyword match, without calling a model
#[derive(Debug, Clone, Default)]
pub struct HeuristicPlanner;

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self
    }

    fn classify(task: &str) -> Shape {
        let text = task.to_lowercase();
        RULES
            .iter()
            .find(|(words, _)| words.iter().any(|w| text.contains(w)))
            .map(|(_, shape)| *shape)
            .unwrap_or(Shape::Change)
    }

    /// Build the plan synchronously; the trait method wraps this
    pub fn build(&self, task: &str) -> TaskPlan {
        let shape = Self::classify(task);
        debug!(?shape, "HeuristicPlanner::build: classified");

        let research = Step::new("step-1", AgentRole::Researcher, format!("Investigate the codebase for: {}", task))
            .with_expected_output("The relevant files, symbols and current behaviour");

        let steps = match shape {
            Shape::Explain => vec![
                research,
                Step::new("step-2", AgentRole::Documenter, format!("Explain: {}", task))
                    .with_context(&["step-1"])
                    .with_expected_output("A clear explanation grounded in the research"),
            ],
            Shape::Test => vec![
                research,
                Step::new("step-2", AgentRole::Tester, format!("Write and run tests for: {}", task))
                    .with_context(&["step-1"])
                    .with_expected_output("New or updated tests and their results")
                    .with_approval(true),
            ],
            Shape::Change => vec![
                research,
                Step::new("step-2", AgentRole::Developer, format!("Implement: {}", task))
                    .with_context(&["step-1"])
                    .with_expected_output("The code change and the files it touched")
                    .with_approval(true),
                Step::new("step-3", AgentRole::Reviewer, format!("Review the change for: {}", task))
                    .with_context(&["step-1", "step-2"])
                    .with_expected_output("Defects found, or confirmation the change is sound"),
            ],
        };

        TaskPlan::new(task, steps)
    }
}

#[async_trait]
impl TaskPlanner for HeuristicPlanner {
    async fn plan(&self, task: &str, workspace: &WorkspaceContext) -> Result<TaskPlan, PlannerError> {
        debug!(%task, root = ?workspace.root, "HeuristicPlanner::plan: called");
        let plan = self.build(task);
        plan.validate()?;
        info!(plan_id = %plan.plan_id, steps = plan.steps.len(), complexity = %plan.complexity, "Planned task");
        Ok(plan)
    }
}
