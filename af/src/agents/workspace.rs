//! What the host knows about the user's workspace

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Workspace details forwarded into prompts when available
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceContext {
    pub root: Option<PathBuf>,
    pub active_file: Option<String>,
    #[serde(default)]
    pub selections: Vec<String>,
}

impl WorkspaceContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Default::default()
        }
    }

    /// Rooted at the current directory, or empty if it cannot be read
    pub fn from_cwd() -> Self {
        std::env::current_dir().map(Self::new).unwrap_or_default()
    }

    pub fn with_active_file(mut self, file: impl Into<String>) -> Self {
        self.active_file = Some(file.into());
        self
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selections.push(selection.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.active_file.is_none() && self.selections.is_empty()
    }
}
