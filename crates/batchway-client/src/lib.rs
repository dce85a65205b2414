//! Request coalescing client for bulk API endpoints.
//!
//! Independent callers issue fine-grained [`LogicalRequest`]s through an
//! [`ApiConnector`]. Requests arriving within a debounce window travel to the
//! bulk endpoint as one array; each caller's [`CompletionHandle`] settles
//! with the response item at its position in that array.
//!
//! GET responses carrying an `ETag` are cached. Later identical GETs are sent
//! with `If-None-Match`, and a `304` answer is replaced by the cached payload
//! before the caller sees it.
//!
//! # Example
//!
//! ```rust,no_run
//! use batchway_client::{ApiConnector, ConnectorConfig, LogicalRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = ApiConnector::from_config(ConnectorConfig::new(
//!     "https://example.com/api/endpoint/",
//! ))?;
//! connector.init();
//!
//! let user = connector.bulk(LogicalRequest::get("user/1"));
//! let groups = connector.bulk(LogicalRequest::get("group").with_query("limit=10"));
//!
//! println!("{:?}", user.await?.data);
//! println!("{:?}", groups.await?.data);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod connector;
pub mod demux;
pub mod error;
pub mod handle;
pub mod observability;
pub mod sender;
pub mod transport;

pub use collector::{CollectorSettings, CollectorStats, RequestCollector};
pub use config::{CacheConfig, ConnectorConfig};
pub use connector::ApiConnector;
pub use demux::{substitute_not_modified, ResponseDemultiplexer, SettleSummary};
pub use error::{BatchError, ConfigError, StatusError, TransportError, TransportResult};
pub use handle::{BatchResult, CollectedEntry, CompletionHandle};
pub use sender::BatchSender;
pub use transport::{
    AuthenticatedTransport, HttpTransport, OutboundBatch, StaticToken, TokenProvider, Transport,
    TransportResponse,
};

pub use batchway_cache::{CacheOverlay, CacheStats, CacheStore, FileStore, MemoryStore};
pub use batchway_types::{BatchResponseItem, BulkMode, HttpMethod, LogicalRequest, RequestPath};
