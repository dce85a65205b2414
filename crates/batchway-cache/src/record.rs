//! Cache keys and records.

use batchway_types::{BatchResponseItem, Headers};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Address of one record: the partition plus the canonical request signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Partition name, `{namespace}-{version}`.
    pub partition: String,
    /// Canonical signature of the GET request.
    pub signature: String,
}

impl CacheKey {
    /// Creates a new key.
    pub fn new(partition: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            signature: signature.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition, self.signature)
    }
}

/// Last validated response for one GET signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Canonical signature of the request that produced this record.
    pub signature: String,
    /// Entity tag sent back as `If-None-Match`.
    pub etag: String,
    /// Original success status.
    pub status: u16,
    /// Response payload.
    pub body: Value,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Write time (unix millis).
    pub stored_at: u64,
}

impl CacheRecord {
    /// Builds a record from a cacheable response item.
    ///
    /// Returns `None` when the item carries no entity tag.
    pub fn from_response(signature: impl Into<String>, item: &BatchResponseItem) -> Option<Self> {
        let etag = item.etag()?.to_string();
        Some(Self {
            signature: signature.into(),
            etag,
            status: item.status,
            body: item.data.clone(),
            headers: item.headers.clone(),
            stored_at: now_millis(),
        })
    }

    /// Turns the record back into a response item standing in for `not_modified`.
    ///
    /// The echoed method and path of the original item are kept.
    pub fn to_response_item(&self, not_modified: &BatchResponseItem) -> BatchResponseItem {
        BatchResponseItem {
            method: not_modified.method,
            path: not_modified.path.clone(),
            status: self.status,
            data: self.body.clone(),
            headers: self.headers.clone(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchway_types::HttpMethod;
    use serde_json::json;

    #[test]
    fn test_record_requires_etag() {
        let item = BatchResponseItem::new(200, json!({"id": 1}));
        assert!(CacheRecord::from_response("GET user/1/", &item).is_none());

        let item = item.with_header("ETag", "\"v1\"");
        let record = CacheRecord::from_response("GET user/1/", &item).unwrap();
        assert_eq!(record.etag, "\"v1\"");
        assert_eq!(record.status, 200);
        assert_eq!(record.body, json!({"id": 1}));
    }

    #[test]
    fn test_record_substitutes_payload_and_keeps_echo() {
        let record = CacheRecord {
            signature: "GET user/2/".to_string(),
            etag: "abc".to_string(),
            status: 200,
            body: json!({"id": 2}),
            headers: Headers::new(),
            stored_at: 0,
        };
        let not_modified =
            BatchResponseItem::new(304, Value::Null).answering(HttpMethod::Get, "user/2");

        let item = record.to_response_item(&not_modified);
        assert_eq!(item.status, 200);
        assert_eq!(item.data, json!({"id": 2}));
        assert_eq!(item.method, Some(HttpMethod::Get));
    }
}
