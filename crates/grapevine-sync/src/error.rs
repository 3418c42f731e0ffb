//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
///
/// Absent sessions and empty candidate lists are not errors: the affected
/// operations return `None` and the caller treats the sync attempt as
/// "could not sync right now".
#[derive(Debug, Error)]
pub enum SyncError {
    /// A storage call failed; surfaced unchanged, never retried here.
    #[error("storage error: {0}")]
    Storage(#[from] grapevine_store::StoreError),

    /// A message could not be canonicalised.
    #[error("content error: {0}")]
    Content(#[from] grapevine_core::CoreError),

    /// A payload failed to serialize while measuring chunk sizes.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal precondition failed. Fatal programming error.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
