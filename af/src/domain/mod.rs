//! Domain types for agentflow
//!
//! Roles, executable plans, step outputs and execution state. The persisted,
//! editable plan shape lives in `planstore`.

mod output;
mod plan;
mod role;
mod state;

pub use output::StepOutput;
pub use plan::{Complexity, Impact, PlanValidationError, Step, TaskPlan};
pub use role::AgentRole;
pub use state::{ExecutionRecord, ExecutionState, ExecutionStatus, FailedStep};
