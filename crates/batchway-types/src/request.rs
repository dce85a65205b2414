//! Logical requests as issued by callers.

use crate::method::HttpMethod;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One segment of a segmented request path.
///
/// Segments may be given as strings or integers; they always travel as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment(String);

impl PathSegment {
    /// Returns the segment text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for PathSegment {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for PathSegment {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for PathSegment {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PathSegment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Signed(n) => Self(n.to_string()),
            Raw::Unsigned(n) => Self(n.to_string()),
        })
    }
}

/// Path of a logical request relative to the API version root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestPath {
    /// A slash-separated path such as `/user/1/`.
    Single(String),
    /// An ordered list of segments such as `["user", 1]`.
    Segments(Vec<PathSegment>),
}

impl RequestPath {
    /// Builds a segmented path.
    pub fn segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Self::Segments(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the path joined by `/` without leading or trailing slashes.
    pub fn normalized(&self) -> String {
        match self {
            Self::Single(path) => path.trim_matches('/').to_string(),
            Self::Segments(segments) => segments
                .iter()
                .map(PathSegment::as_str)
                .collect::<Vec<_>>()
                .join("/")
                .trim_matches('/')
                .to_string(),
        }
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl From<&str> for RequestPath {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for RequestPath {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<PathSegment>> for RequestPath {
    fn from(value: Vec<PathSegment>) -> Self {
        Self::Segments(value)
    }
}

impl Serialize for RequestPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(_) => serializer.serialize_str(&self.normalized()),
            Self::Segments(segments) => segments.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RequestPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Single(String),
            Segments(Vec<PathSegment>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Single(path) => Self::Single(path),
            Raw::Segments(segments) => Self::Segments(segments),
        })
    }
}

/// One caller's intent, to be coalesced with others into a bulk call.
///
/// Serializes to the bulk wire shape
/// `{method, path, version?, query?, headers?, data?}`. The `requires_auth`
/// flag only selects the transport and never reaches the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalRequest {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Path relative to the API version root.
    pub path: RequestPath,
    /// API version override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Pre-encoded query string without the leading `?`.
    #[serde(
        default,
        skip_serializing_if = "query_is_empty",
        deserialize_with = "deserialize_query"
    )]
    pub query: Option<String>,
    /// Per-request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Request payload.
    #[serde(default, rename = "data", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Whether the batch carrying this request must use the authenticated transport.
    #[serde(default, rename = "auth", skip_serializing)]
    pub requires_auth: bool,
}

fn query_is_empty(query: &Option<String>) -> bool {
    query.as_deref().map_or(true, str::is_empty)
}

fn deserialize_query<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|q| strip_query_prefix(&q)).filter(|q| !q.is_empty()))
}

fn strip_query_prefix(query: &str) -> String {
    query.strip_prefix('?').unwrap_or(query).to_string()
}

impl LogicalRequest {
    /// Creates a request with no query, headers or body.
    pub fn new(method: HttpMethod, path: impl Into<RequestPath>) -> Self {
        Self {
            method,
            path: path.into(),
            version: None,
            query: None,
            headers: BTreeMap::new(),
            body: None,
            requires_auth: false,
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<RequestPath>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Creates a POST request with a body.
    pub fn post(path: impl Into<RequestPath>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    /// Creates a PUT request with a body.
    pub fn put(path: impl Into<RequestPath>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    /// Creates a PATCH request with a body.
    pub fn patch(path: impl Into<RequestPath>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, path).with_body(body)
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<RequestPath>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Sets the API version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets a pre-encoded query string. A leading `?` is dropped.
    #[must_use]
    pub fn with_query(mut self, query: impl AsRef<str>) -> Self {
        let query = strip_query_prefix(query.as_ref());
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Encodes key/value pairs as the query string.
    #[must_use]
    pub fn with_query_pairs<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in pairs {
            serializer.append_pair(key.as_ref(), value.as_ref());
        }
        let encoded = serializer.finish();
        self.with_query(encoded)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Marks the request as requiring the authenticated transport.
    #[must_use]
    pub fn with_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }

    /// Inserts a header, replacing any existing header of the same name
    /// regardless of case.
    pub fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }

    /// Looks a header up by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the query string if it is non-empty.
    pub fn query_str(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(|q| q.strip_prefix('?').unwrap_or(q))
            .filter(|q| !q.is_empty())
    }

    /// Returns the canonical cache signature for GET requests.
    ///
    /// The signature is `GET {path}/` or `GET {path}/?{query}`; every other
    /// verb has no signature and is never cached.
    pub fn signature(&self) -> Option<String> {
        if self.method != HttpMethod::Get {
            return None;
        }
        let path = self.path.normalized();
        Some(match self.query_str() {
            Some(query) => format!("{} {path}/?{query}", self.method.as_upper()),
            None => format!("{} {path}/", self.method.as_upper()),
        })
    }
}
