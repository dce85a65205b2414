//! Common types used throughout `batchway`.
//!
//! This crate provides the wire-level vocabulary shared by the cache overlay
//! and the coalescing client: logical requests as callers describe them,
//! response items as the bulk endpoint returns them, and the transmission
//! modes the bulk endpoint understands.

mod method;
mod request;
mod response;

pub use method::{BulkMode, HttpMethod, ParseMethodError};
pub use request::{LogicalRequest, PathSegment, RequestPath};
pub use response::{is_valid_status, BatchResponseItem, Headers};

/// Header carrying the entity tag of a cacheable response.
pub const ETAG_HEADER: &str = "ETag";

/// Conditional request header carrying a previously seen entity tag.
pub const IF_NONE_MATCH_HEADER: &str = "If-None-Match";

/// Status a bulk endpoint uses for a validated, unchanged resource.
pub const STATUS_NOT_MODIFIED: u16 = 304;
