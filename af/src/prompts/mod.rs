//! Prompt Template System
//!
//! Template loading chain:
//! 1. `<workspace>/.agentflow/prompts/{name}.pmt` (user override)
//! 2. Embedded fallback compiled from `af/prompts/`
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::PromptLoader;
