//! Task planning: turn a task description into an executable plan
//!
//! Two interchangeable strategies sit behind [`TaskPlanner`]: a keyword rule
//! table that needs no model, and a model-backed planner.

use async_trait::async_trait;
use planstore::SavedPlan;
use thiserror::Error;

use crate::agents::WorkspaceContext;
use crate::domain::{PlanValidationError, TaskPlan};
use crate::extract::MalformedResponse;
use crate::llm::LlmError;

mod heuristic;
mod llm;

pub use heuristic::HeuristicPlanner;
pub use llm::LlmPlanner;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("No model selected for the {role} role; set models.{role} in the config")]
    NoModelSelected { role: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    MalformedResponse(#[from] MalformedResponse),

    #[error("Invalid plan: {0}")]
    InvalidPlan(#[from] PlanValidationError),

    #[error("Prompt error: {0}")]
    Prompt(String),
}

/// Produces a plan for a task
#[async_trait]
pub trait TaskPlanner: Send + Sync {
    async fn plan(&self, task: &str, workspace: &WorkspaceContext) -> Result<TaskPlan, PlannerError>;

    /// Plan a task and produce the form it should be saved in
    ///
    /// Planners that know more than [`TaskPlan`] carries (title, tags,
    /// per-step tools and risk) override this so nothing is lost on save.
    async fn plan_for_saving(
        &self,
        task: &str,
        workspace: &WorkspaceContext,
    ) -> Result<(TaskPlan, SavedPlan), PlannerError> {
        let plan = self.plan(task, workspace).await?;
        let saved = plan.to_saved();
        Ok((plan, saved))
    }
}
