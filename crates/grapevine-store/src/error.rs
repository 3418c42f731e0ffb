//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A record failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A cursor did not match any stored record.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// I/O error from the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
