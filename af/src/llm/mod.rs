//! LLM client module
//!
//! The model-call boundary: one trait, one HTTP implementation.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client for the configured provider
///
/// `default_model` is used for requests that do not name a model.
pub fn create_client(config: &LlmConfig, default_model: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, %default_model, "create_client: called");
    match config.provider.as_str() {
        "openai" | "openai-compatible" => Ok(Arc::new(OpenAIClient::from_config(config, default_model)?)),
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Config(format!(
                "Unknown LLM provider: '{}'. Supported: openai, openai-compatible",
                other
            )))
        }
    }
}
