//! HTTP verbs for logical requests and bulk transmission modes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// HTTP verb of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read a resource.
    Get,
    /// Create a resource or invoke an action.
    Post,
    /// Replace a resource.
    Put,
    /// Partially update a resource.
    Patch,
    /// Remove a resource.
    Delete,
}

/// Error returned when a verb string is not one of the supported methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseMethodError(pub String);

impl HttpMethod {
    /// Lowercase form used inside bulk request bodies.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    /// Uppercase form, as used in cache signatures and outer HTTP calls.
    pub const fn as_upper(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" => Ok(Self::Delete),
            _ => Err(ParseMethodError(s.to_string())),
        }
    }
}

impl Serialize for HttpMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How the bulk endpoint executes one transmitted batch.
///
/// The mode is carried by the verb of the outer HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkMode {
    /// Every logical request runs independently; one failure does not affect siblings.
    #[default]
    Simple,
    /// All logical requests run in one transaction and are rolled back together.
    Transactional,
}

impl BulkMode {
    /// Returns the outer HTTP verb selecting this mode.
    pub const fn outer_method(&self) -> HttpMethod {
        match self {
            Self::Simple => HttpMethod::Put,
            Self::Transactional => HttpMethod::Post,
        }
    }
}

impl fmt::Display for BulkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Transactional => f.write_str("transactional"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("options".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_method_serializes_lowercase() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"delete\"");

        let parsed: HttpMethod = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(parsed, HttpMethod::Post);
    }

    #[test]
    fn test_bulk_mode_outer_method() {
        assert_eq!(BulkMode::Simple.outer_method(), HttpMethod::Put);
        assert_eq!(BulkMode::Transactional.outer_method(), HttpMethod::Post);
        assert_eq!(BulkMode::default(), BulkMode::Simple);
    }
}
