//! Store error types

use thiserror::Error;

/// Errors from plan storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No workspace is open; project-scope storage is unavailable")]
    NoWorkspace,

    #[error("Plan not found: {0}")]
    NotFound(String),

    #[error("Invalid id {0:?}: only letters, digits, '-', '_' and '.' are allowed")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Key-value store error: {0}")]
    Kv(String),
}

impl StoreError {
    /// Whether this error means the record simply is not there
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NoWorkspace | StoreError::NotFound(_) => true,
            StoreError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
