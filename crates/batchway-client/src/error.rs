//! Error types for the coalescing client.
//!
//! Three scopes of failure exist:
//!
//! - [`TransportError`] fails a whole batch; every caller in it receives the
//!   same shared instance.
//! - [`StatusError`] fails a single logical request; its siblings settle
//!   normally.
//! - Cache errors never surface here (see `batchway_cache::CacheError`).

use batchway_cache::CacheError;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failure of one wire-level bulk transmission.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bulk endpoint could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The bulk endpoint answered the outer call with a non-success status.
    #[error("bulk endpoint returned status {status}: {body}")]
    Status {
        /// Outer HTTP status.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The request array could not be encoded.
    #[error("failed to encode bulk request: {0}")]
    Encode(String),

    /// The response body is not a bulk response array.
    #[error("invalid bulk response: {0}")]
    Decode(String),

    /// Fewer response items than requests came back.
    #[error("bulk response has {actual} items for {expected} requests")]
    CountMismatch {
        /// Number of requests sent.
        expected: usize,
        /// Number of response items received.
        actual: usize,
    },

    /// Credentials for the authenticated transport are unavailable.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// A response item whose status falls outside `200..400`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("request failed with status {status}")]
pub struct StatusError {
    /// Status of the individual response item.
    pub status: u16,
    /// Payload of the individual response item.
    pub body: Value,
}

/// Outcome error of one logical request.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// The batch carrying the request failed as a whole.
    #[error(transparent)]
    Transport(Arc<TransportError>),

    /// The request itself was answered with an error status.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// The request was dropped before its batch settled.
    #[error("request abandoned before its batch settled")]
    Abandoned,
}

impl BatchError {
    /// Returns the per-request status, if this is a status failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(e) => Some(e.status),
            _ => None,
        }
    }

    /// Returns the shared transport error, if this is a batch failure.
    pub fn transport(&self) -> Option<&Arc<TransportError>> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised while building a connector from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The configuration sources could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The bulk endpoint is not a valid URL.
    #[error("invalid endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] TransportError),

    /// The cache store could not be opened.
    #[error("failed to open cache store: {0}")]
    Cache(#[from] CacheError),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
