//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Step system prompt: role persona, tools and workspace
pub const STEP_SYSTEM: &str = include_str!("../../prompts/step-system.pmt");

/// Step user prompt without prior context
pub const STEP_USER: &str = include_str!("../../prompts/step-user.pmt");

/// Step user prompt carrying aggregated context
pub const STEP_USER_CONTEXT: &str = include_str!("../../prompts/step-user-context.pmt");

/// LLM planner prompt
pub const PLANNER: &str = include_str!("../../prompts/planner.pmt");

/// Plan editing system prompt
pub const EDITOR: &str = include_str!("../../prompts/editor.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "step-system" => Some(STEP_SYSTEM),
        "step-user" => Some(STEP_USER),
        "step-user-context" => Some(STEP_USER_CONTEXT),
        "planner" => Some(PLANNER),
        "editor" => Some(EDITOR),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
