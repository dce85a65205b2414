//! Connector configuration.
//!
//! Values come from an optional configuration file (YAML, TOML or JSON,
//! picked by extension) overlaid with `BATCHWAY_*` environment variables.
//! Nested keys use a double underscore: `BATCHWAY_CACHE__DIR=/var/cache/bw`.
//! `BATCHWAY_REAL_QUERY_TIMEOUT` overrides the debounce delay in
//! milliseconds.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BATCHWAY";

/// Default bulk endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/api/endpoint/";

/// Default debounce delay.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Runtime setting that overrides `debounce_ms` from any source.
pub const REAL_QUERY_TIMEOUT_KEY: &str = "real_query_timeout";

/// Default cache namespace.
pub const DEFAULT_CACHE_NAMESPACE: &str = "etags-cache";

/// Configuration of the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether GET responses are cached and revalidated.
    pub enabled: bool,
    /// Namespace prefix of cache partitions.
    pub namespace: String,
    /// Application/user version; a change invalidates older partitions.
    pub version_tag: String,
    /// Directory of the on-disk store; in-memory when unset.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            version_tag: "0".to_string(),
            dir: None,
        }
    }
}

/// Configuration of an [`ApiConnector`](crate::ApiConnector).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// URL of the bulk endpoint.
    pub endpoint_url: String,
    /// Quiet period after the last enqueue before a batch is sent.
    pub debounce_ms: u64,
    /// Longest time a window may accumulate; unlimited when unset.
    pub max_batch_age_ms: Option<u64>,
    /// Cap on concurrently transmitting batches; unlimited when unset.
    pub max_in_flight_batches: Option<usize>,
    /// Response cache.
    pub cache: CacheConfig,
    /// Headers added to every outer bulk call.
    pub default_headers: BTreeMap<String, String>,
    /// User agent of the outer bulk call.
    pub user_agent: String,
    /// Static credential for the authenticated transport.
    pub auth_token: Option<String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            endpoint_url: DEFAULT_ENDPOINT.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_batch_age_ms: None,
            max_in_flight_batches: None,
            cache: CacheConfig::default(),
            default_headers: BTreeMap::new(),
            user_agent: format!("batchway/{}", env!("CARGO_PKG_VERSION")),
            auth_token: None,
        }
    }
}

impl ConnectorConfig {
    /// Creates a default configuration pointing at `endpoint_url`.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Loads configuration from an optional file and an explicit environment.
    ///
    /// `env` replaces the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        let merged = builder.build()?;
        let mut config: Self = merged.clone().try_deserialize()?;
        if let Ok(debounce_ms) = merged.get::<u64>(REAL_QUERY_TIMEOUT_KEY) {
            config.debounce_ms = debounce_ms;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("debounce_ms must be positive".into()));
        }
        if self.max_batch_age_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "max_batch_age_ms must be positive when set".into(),
            ));
        }
        if self.max_in_flight_batches == Some(0) {
            return Err(ConfigError::Invalid(
                "max_in_flight_batches must be positive when set".into(),
            ));
        }
        if self.cache.enabled && self.cache.namespace.is_empty() {
            return Err(ConfigError::Invalid("cache.namespace must not be empty".into()));
        }
        Ok(())
    }

    /// Returns the parsed bulk endpoint.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.endpoint_url)?)
    }

    /// Returns the debounce delay.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the accumulation ceiling, if any.
    pub fn max_batch_age(&self) -> Option<Duration> {
        self.max_batch_age_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, ConnectorConfig::default());
        assert_eq!(config.debounce(), Duration::from_millis(100));
        assert!(config.max_batch_age().is_none());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.namespace, "etags-cache");
    }

    #[test]
    fn test_file_then_env_override() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "endpoint_url: https://api.example.com/api/endpoint/\n\
             debounce_ms: 250\n\
             cache:\n  version_tag: \"1.4.0\"\n\
             default_headers:\n  x-csrftoken: abc"
        )
        .unwrap();

        let config = ConnectorConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("BATCHWAY_REAL_QUERY_TIMEOUT", "40"),
                ("BATCHWAY_CACHE__DIR", "/tmp/bw-cache"),
                ("BATCHWAY_MAX_IN_FLIGHT_BATCHES", "4"),
            ]),
        )
        .unwrap();

        assert_eq!(config.endpoint_url, "https://api.example.com/api/endpoint/");
        assert_eq!(config.debounce(), Duration::from_millis(40));
        assert_eq!(config.cache.version_tag, "1.4.0");
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/bw-cache")));
        assert_eq!(config.max_in_flight_batches, Some(4));
        assert_eq!(
            config.default_headers.get("x-csrftoken").map(String::as_str),
            Some("abc")
        );
    }

    #[test]
    fn test_env_strings_are_not_reinterpreted() {
        let config = ConnectorConfig::load_with_env(
            None,
            env(&[
                ("BATCHWAY_CACHE__VERSION_TAG", "1.10"),
                ("BATCHWAY_AUTH_TOKEN", "000123"),
                ("BATCHWAY_USER_AGENT", "true"),
                ("BATCHWAY_CACHE__ENABLED", "false"),
                ("BATCHWAY_MAX_BATCH_AGE_MS", "750"),
            ]),
        )
        .unwrap();

        assert_eq!(config.cache.version_tag, "1.10");
        assert_eq!(config.auth_token.as_deref(), Some("000123"));
        assert_eq!(config.user_agent, "true");
        assert!(!config.cache.enabled);
        assert_eq!(config.max_batch_age(), Some(Duration::from_millis(750)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConnectorConfig::default();
        config.debounce_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ConnectorConfig::default();
        config.max_in_flight_batches = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ConnectorConfig::new("not a url");
        assert!(matches!(config.validate(), Err(ConfigError::Endpoint(_))));
    }
}
