//! Context aggregation between steps

use tracing::debug;

use crate::domain::{Step, StepOutput};

/// Separator placed before each piece of earlier output
pub const CONTEXT_DELIMITER: &str = "=== Output from previous step ===";

/// Detailed text of every earlier output `step` depends on, in plan order
///
/// Empty when the step has no dependencies or none of them produced output.
pub fn aggregate_context(step: &Step, outputs: &[StepOutput]) -> String {
    debug!(step_id = %step.id, deps = step.context_step_ids.len(), "aggregate_context: called");
    if step.context_step_ids.is_empty() {
        return String::new();
    }
    outputs
        .iter()
        .filter(|o| step.context_step_ids.contains(&o.step_id))
        .map(|o| format!("{}\n{}", CONTEXT_DELIMITER, o.detailed_text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
