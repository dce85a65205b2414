//! Cache error types.

use thiserror::Error;

/// Errors raised by cache stores.
///
/// These never reach callers of the coalescing client: the overlay logs them
/// and carries on as if no cache were present.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record is unreadable or inconsistent with its key.
    #[error("corrupt cache record: {0}")]
    Corrupt(String),

    /// A partition name cannot be used by the store.
    #[error("invalid partition name: {0}")]
    InvalidPartition(String),
}
