//! Error types for the tramitation engine

use thiserror::Error;

/// Main error type for all engine operations
#[derive(Error, Debug)]
pub enum TramitaError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl TramitaError {
    /// A conflict can be retried by the caller; everything else is final
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, TramitaError>;
