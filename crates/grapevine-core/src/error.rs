//! Error types for the Grapevine core.

use thiserror::Error;

/// Errors raised by pure core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The content variant is unknown to this build; the message cannot be
    /// canonicalised (and so cannot be synced) until the host upgrades.
    #[error("unsupported content variant")]
    UnsupportedContent,

    /// A hex string had the wrong length or invalid characters.
    #[error("invalid hex string of length {0}")]
    InvalidHex(usize),
}
