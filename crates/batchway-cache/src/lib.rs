//! Conditional response cache for batchway.
//!
//! This crate keeps the last validated response of every GET request,
//! keyed by its canonical signature, and overlays `If-None-Match`
//! validation on outgoing bulk batches.
//!
//! Records live in a [`CacheStore`], partitioned by `{namespace}-{version}`
//! so that an application or user version bump invalidates everything
//! written by older versions.

mod error;
#[cfg(feature = "file")]
mod file;
mod memory;
mod overlay;
mod record;
mod traits;

pub use error::CacheError;
#[cfg(feature = "file")]
pub use file::FileStore;
pub use memory::MemoryStore;
pub use overlay::{CacheOverlay, CacheStats, PreparedBatch};
pub use record::{CacheKey, CacheRecord};
pub use traits::CacheStore;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
