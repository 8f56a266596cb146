//! Conversational plan editing
//!
//! The model replies in prose and may embed a structured update. The reply is
//! scanned by [`parse_update`], applied by [`apply_update`], snapshotted for
//! undo and persisted by [`PlanEditEngine`]. [`PlanEditor`] wraps a whole
//! editing session around the plan's edit lock.

use planstore::StoreError;
use thiserror::Error;

use crate::llm::LlmError;

mod apply;
mod engine;
mod parse;
mod session;

pub use apply::{apply_update, normalize_step, normalize_steps, parse_tags};
pub use engine::{EditOutcome, PlanEditEngine};
pub use parse::{Operation, PlanUpdate, Section, parse_update};
pub use session::PlanEditor;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("No model selected for the editor role; set models.editor in the config")]
    NoModelSelected,

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("{0}")]
    Locked(String),

    #[error("Invalid {section} content: {reason}")]
    InvalidContent { section: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Prompt error: {0}")]
    Prompt(String),
}
