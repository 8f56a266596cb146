//! Orchestrator event vocabulary

use serde::{Deserialize, Serialize};

use crate::domain::AgentRole;
use crate::llm::TokenUsage;

/// Progress notifications emitted while a plan runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrchestratorEvent {
    /// Execution of a plan has begun
    PlanStarted {
        plan_id: String,
        task: String,
        total_steps: usize,
    },
    /// A step is about to run
    StepStarted {
        plan_id: String,
        step_id: String,
        step_index: usize,
        agent_role: AgentRole,
        description: String,
    },
    /// A step produced output without warnings
    StepCompleted {
        plan_id: String,
        step_id: String,
        summary: String,
        duration_ms: u64,
        token_usage: Option<TokenUsage>,
    },
    /// A step failed; execution continues
    StepFailed {
        plan_id: String,
        step_id: String,
        error: String,
    },
    /// All steps have been attempted
    PlanCompleted {
        plan_id: String,
        succeeded: usize,
        failed: usize,
    },
}

impl OrchestratorEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PlanStarted { .. } => "plan_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
            Self::PlanCompleted { .. } => "plan_completed",
        }
    }

    pub fn plan_id(&self) -> &str {
        match self {
            Self::PlanStarted { plan_id, .. }
            | Self::StepStarted { plan_id, .. }
            | Self::StepCompleted { plan_id, .. }
            | Self::StepFailed { plan_id, .. }
            | Self::PlanCompleted { plan_id, .. } => plan_id,
        }
    }
}
