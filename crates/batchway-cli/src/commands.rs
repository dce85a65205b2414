//! CLI command implementations.

use anyhow::{bail, Context, Result};
use batchway_cache::{CacheOverlay, CacheStore, FileStore};
use batchway_client::{
    ApiConnector, BatchError, BatchResult, BulkMode, ConnectorConfig, LogicalRequest,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options of the `send` command.
#[derive(Debug, Default)]
pub struct SendOptions {
    pub endpoint: Option<String>,
    pub transactional: bool,
    pub auth_token: Option<String>,
}

/// Loads configuration, falling back to the user cache directory for the store.
fn load_config(path: Option<&Path>) -> Result<ConnectorConfig> {
    let mut config = ConnectorConfig::load(path).context("failed to load configuration")?;
    if config.cache.dir.is_none() {
        config.cache.dir = default_cache_dir();
    }
    Ok(config)
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("batchway"))
}

fn read_requests(file: &Path) -> Result<Vec<LogicalRequest>> {
    let raw = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let requests: Vec<LogicalRequest> = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not an array of requests", file.display()))?;
    if requests.is_empty() {
        bail!("{} contains no requests", file.display());
    }
    Ok(requests)
}

/// Renders one settled request for output.
pub fn outcome_json(outcome: BatchResult) -> Value {
    match outcome {
        Ok(item) => json!({ "ok": item }),
        Err(BatchError::Status(e)) => json!({
            "error": e.to_string(),
            "status": e.status,
            "body": e.body,
        }),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

/// Send a request file through a connector and print the outcomes.
pub async fn send(config_path: Option<&Path>, file: &Path, options: SendOptions) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(endpoint) = options.endpoint {
        config.endpoint_url = endpoint;
    }
    if options.auth_token.is_some() {
        config.auth_token = options.auth_token;
    }

    let requests = read_requests(file)?;
    let connector = ApiConnector::from_config(config).context("failed to build connector")?;
    connector.init();

    tracing::info!(
        endpoint = %connector.config().endpoint_url,
        requests = requests.len(),
        transactional = options.transactional,
        "Sending requests"
    );

    let output = if options.transactional {
        let items = connector
            .bulk_raw(requests, BulkMode::Transactional, false)
            .await
            .context("transactional batch failed")?;
        serde_json::to_value(items)?
    } else {
        let handles: Vec<_> = requests.into_iter().map(|r| connector.bulk(r)).collect();
        connector.flush_now();
        let outcomes = futures::future::join_all(handles).await;
        Value::Array(outcomes.into_iter().map(outcome_json).collect())
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn open_store(config: &ConnectorConfig) -> Result<FileStore> {
    let Some(dir) = &config.cache.dir else {
        bail!("no cache directory configured");
    };
    FileStore::open(dir).with_context(|| format!("failed to open cache at {}", dir.display()))
}

/// Counts records per partition.
pub fn partition_counts(store: &dyn CacheStore) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for partition in store.partitions()? {
        counts.insert(partition, 0);
    }
    for key in store.keys()? {
        *counts.entry(key.partition).or_insert(0) += 1;
    }
    Ok(counts)
}

/// List cache partitions.
pub fn cache_list(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let current = format!("{}-{}", config.cache.namespace, config.cache.version_tag);

    println!("Cache: {}", store.root().display());
    let counts = partition_counts(&store)?;
    if counts.is_empty() {
        println!("  (empty)");
    }
    for (partition, records) in counts {
        let marker = if partition == current { " (current)" } else { "" };
        println!("  {partition}: {records} records{marker}");
    }
    Ok(())
}

/// Purge stale partitions, or every partition of the namespace with `all`.
pub fn cache_purge(config_path: Option<&Path>, all: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let overlay = CacheOverlay::new(
        Arc::new(store),
        config.cache.namespace.clone(),
        &config.cache.version_tag,
    );

    let removed = if all {
        overlay.purge_all()?
    } else {
        overlay.purge_stale_partitions()?
    };
    println!("Removed {removed} cached records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchway_cache::{CacheKey, CacheRecord};
    use batchway_client::StatusError;
    use batchway_types::{BatchResponseItem, Headers};
    use tempfile::TempDir;

    fn record(signature: &str) -> CacheRecord {
        CacheRecord {
            signature: signature.to_string(),
            etag: "e".to_string(),
            status: 200,
            body: json!(null),
            headers: Headers::new(),
            stored_at: 0,
        }
    }

    #[test]
    fn test_read_requests() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("requests.json");
        std::fs::write(
            &file,
            r#"[{"method": "get", "path": "user/1"}, {"method": "POST", "path": ["user"], "data": {"a": 1}, "auth": true}]"#,
        )
        .unwrap();

        let requests = read_requests(&file).unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].requires_auth);

        std::fs::write(&file, "[]").unwrap();
        assert!(read_requests(&file).is_err());
    }

    #[test]
    fn test_outcome_json() {
        let ok = outcome_json(Ok(BatchResponseItem::new(200, json!({"id": 1}))));
        assert_eq!(ok["ok"]["data"], json!({"id": 1}));

        let failed = outcome_json(Err(BatchError::Status(StatusError {
            status: 404,
            body: json!({"detail": "missing"}),
        })));
        assert_eq!(failed["status"], json!(404));
        assert_eq!(failed["error"], json!("request failed with status 404"));
    }

    #[test]
    fn test_partition_counts() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .put(CacheKey::new("etags-cache-1", "GET a/"), record("GET a/"))
            .unwrap();
        store
            .put(CacheKey::new("etags-cache-1", "GET b/"), record("GET b/"))
            .unwrap();
        store
            .put(CacheKey::new("etags-cache-2", "GET a/"), record("GET a/"))
            .unwrap();

        let counts = partition_counts(&store).unwrap();
        assert_eq!(counts["etags-cache-1"], 2);
        assert_eq!(counts["etags-cache-2"], 1);
    }
}
