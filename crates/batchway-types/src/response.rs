//! Response items returned by the bulk endpoint.

use crate::method::HttpMethod;
use crate::request::RequestPath;
use crate::ETAG_HEADER;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Header map of one response item.
pub type Headers = BTreeMap<String, String>;

/// Returns true if `status` counts as a successful outcome (`200..400`).
pub const fn is_valid_status(status: u16) -> bool {
    status >= 200 && status < 400
}

/// One element of the bulk response array.
///
/// Items are positionally parallel to the request array of the same batch:
/// item `i` answers request `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseItem {
    /// Echo of the request verb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    /// Echo of the request path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<RequestPath>,
    /// HTTP status of the individual request.
    pub status: u16,
    /// Response payload.
    #[serde(default)]
    pub data: Value,
    /// Response headers (`ETag`, `Content-Type`, ...).
    #[serde(default)]
    pub headers: Headers,
}

impl BatchResponseItem {
    /// Creates an item with the given status and payload.
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            method: None,
            path: None,
            status,
            data,
            headers: Headers::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the echoed verb and path.
    #[must_use]
    pub fn answering(mut self, method: HttpMethod, path: impl Into<RequestPath>) -> Self {
        self.method = Some(method);
        self.path = Some(path.into());
        self
    }

    /// Looks a header up by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the entity tag, if any.
    pub fn etag(&self) -> Option<&str> {
        self.header(ETAG_HEADER).filter(|tag| !tag.is_empty())
    }

    /// Returns true if the status is within `200..400`.
    pub fn is_success(&self) -> bool {
        is_valid_status(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_boundaries() {
        assert!(is_valid_status(200));
        assert!(is_valid_status(304));
        assert!(is_valid_status(399));
        assert!(!is_valid_status(400));
        assert!(!is_valid_status(101));
        assert!(!is_valid_status(500));
    }

    #[test]
    fn test_is_success_follows_status() {
        assert!(BatchResponseItem::new(304, json!(null)).is_success());
        assert!(!BatchResponseItem::new(404, json!({"detail": "gone"})).is_success());
    }

    #[test]
    fn test_deserialize_minimal_item() {
        let item: BatchResponseItem = serde_json::from_value(json!({"status": 204})).unwrap();
        assert_eq!(item.status, 204);
        assert_eq!(item.data, Value::Null);
        assert!(item.headers.is_empty());
        assert!(item.method.is_none());
    }

    #[test]
    fn test_deserialize_full_item() {
        let item: BatchResponseItem = serde_json::from_value(json!({
            "method": "GET",
            "path": ["user", 1],
            "status": 200,
            "data": {"id": 1},
            "headers": {"etag": "\"abc\"", "Content-Type": "application/json"}
        }))
        .unwrap();

        assert_eq!(item.method, Some(HttpMethod::Get));
        assert_eq!(item.path.as_ref().map(RequestPath::normalized).as_deref(), Some("user/1"));
        assert_eq!(item.etag(), Some("\"abc\""));
    }

    #[test]
    fn test_empty_etag_is_ignored() {
        let item = BatchResponseItem::new(200, json!({})).with_header("ETag", "");
        assert!(item.etag().is_none());
    }
}
