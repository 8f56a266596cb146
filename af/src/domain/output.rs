//! Step outputs

use serde::{Deserialize, Serialize};

use crate::llm::TokenUsage;

/// Result of one attempted step; failed attempts carry their error in `warnings`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutput {
    pub step_id: String,
    pub summary: String,
    pub detailed_text: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_written: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl StepOutput {
    /// A failed attempt with the error in summary, detail and warnings
    pub fn failed(step_id: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        let error = error.into();
        Self {
            step_id: step_id.into(),
            summary: error.clone(),
            detailed_text: error.clone(),
            warnings: vec![error],
            duration_ms,
            ..Default::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Any warning mentioning lint
    pub fn has_lint_error(&self) -> bool {
        self.warnings.iter().any(|w| w.to_lowercase().contains("lint"))
    }

    /// The error text of a failed attempt
    pub fn error(&self) -> Option<&str> {
        self.warnings.first().map(String::as_str)
    }
}
