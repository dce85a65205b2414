//! Connector facade: one configured collector, sender and cache per instance.

use crate::collector::{CollectorSettings, CollectorStats, RequestCollector};
use crate::config::ConnectorConfig;
use crate::demux::ResponseDemultiplexer;
use crate::error::{ConfigError, TransportResult};
use crate::handle::CompletionHandle;
use crate::sender::BatchSender;
use crate::transport::{AuthenticatedTransport, HttpTransport, StaticToken, Transport};
use batchway_cache::{CacheOverlay, CacheStats, CacheStore, FileStore, MemoryStore, PreparedBatch};
use batchway_types::{BatchResponseItem, BulkMode, LogicalRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for issuing logical requests against a bulk endpoint.
///
/// Instances are independent: each owns its debounce window, its
/// transports and its view of the cache.
#[derive(Debug, Clone)]
pub struct ApiConnector {
    config: ConnectorConfig,
    sender: BatchSender,
    overlay: Option<Arc<CacheOverlay>>,
    demux: ResponseDemultiplexer,
    collector: RequestCollector,
}

impl ApiConnector {
    /// Builds a connector with `reqwest` transports and the configured store.
    pub fn from_config(config: ConnectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let http = HttpTransport::new(&config.user_agent, &config.default_headers)?;
        let authenticated: Option<Arc<dyn Transport>> = config.auth_token.as_ref().map(|token| {
            Arc::new(AuthenticatedTransport::new(
                http.clone(),
                Arc::new(StaticToken::bearer(token)),
            )) as Arc<dyn Transport>
        });

        let store = if !config.cache.enabled {
            None
        } else if let Some(dir) = &config.cache.dir {
            Some(Arc::new(FileStore::open(dir)?) as Arc<dyn CacheStore>)
        } else {
            Some(Arc::new(MemoryStore::new()) as Arc<dyn CacheStore>)
        };

        Self::with_parts(config, Arc::new(http), authenticated, store)
    }

    /// Builds a connector from explicit collaborators.
    ///
    /// `store` is ignored when the cache is disabled in `config`.
    pub fn with_parts(
        config: ConnectorConfig,
        public: Arc<dyn Transport>,
        authenticated: Option<Arc<dyn Transport>>,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut sender = BatchSender::new(config.endpoint()?, public);
        if let Some(transport) = authenticated {
            sender = sender.with_authenticated(transport);
        }

        let overlay = match store {
            Some(store) if config.cache.enabled => Some(Arc::new(CacheOverlay::new(
                store,
                config.cache.namespace.clone(),
                &config.cache.version_tag,
            ))),
            _ => None,
        };

        let settings = CollectorSettings {
            debounce: config.debounce(),
            max_batch_age: config.max_batch_age(),
            max_in_flight_batches: config.max_in_flight_batches,
            mode: BulkMode::Simple,
        };
        let collector = RequestCollector::new(settings, sender.clone(), overlay.clone());
        let demux = ResponseDemultiplexer::new(overlay.clone());

        Ok(Self {
            config,
            sender,
            overlay,
            demux,
            collector,
        })
    }

    /// Purges cache partitions left behind by other versions.
    ///
    /// Returns the number of records removed. Partitions that fail to clear
    /// are skipped; if the partitions cannot be listed at all, the failure is
    /// logged and reported as zero.
    pub fn init(&self) -> usize {
        let Some(overlay) = &self.overlay else {
            return 0;
        };
        match overlay.purge_stale_partitions() {
            Ok(removed) => {
                info!(
                    partition = overlay.partition(),
                    removed, "Cache initialized"
                );
                removed
            }
            Err(e) => {
                warn!(partition = overlay.partition(), error = %e, "Failed to purge stale cache partitions");
                0
            }
        }
    }

    /// Enqueues a request for the next coalesced batch.
    pub fn bulk(&self, request: LogicalRequest) -> CompletionHandle {
        self.collector.enqueue(request)
    }

    /// Sends `requests` as one batch right away, bypassing the collector.
    ///
    /// The cache overlay still applies. Items are returned positionally and
    /// without status validation.
    pub async fn bulk_raw(
        &self,
        requests: Vec<LogicalRequest>,
        mode: BulkMode,
        force_auth: bool,
    ) -> TransportResult<Vec<BatchResponseItem>> {
        let prepared = match &self.overlay {
            Some(overlay) => overlay.prepare(requests),
            None => PreparedBatch {
                requests,
                hits: HashMap::new(),
            },
        };

        let mut responses = self
            .sender
            .send(&prepared.requests, mode, force_auth)
            .await?;
        self.demux
            .reconcile(&prepared.requests, &mut responses, &prepared.hits);
        Ok(responses)
    }

    /// Flushes the accumulating window immediately.
    pub fn flush_now(&self) -> usize {
        self.collector.flush_now()
    }

    /// Returns the collector statistics.
    pub fn stats(&self) -> CollectorStats {
        self.collector.stats()
    }

    /// Returns the cache statistics, if caching is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.overlay.as_ref().map(|o| o.stats())
    }

    /// Returns the cache overlay, if caching is enabled.
    pub fn overlay(&self) -> Option<&Arc<CacheOverlay>> {
        self.overlay.as_ref()
    }

    /// Returns the connector configuration.
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchway_cache::{CacheKey, CacheRecord};
    use batchway_types::Headers;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ConnectorConfig {
        let mut config = ConnectorConfig::new(format!("{}/api/endpoint/", server.uri()));
        config.debounce_ms = 10;
        config.cache.version_tag = "2".to_string();
        config
    }

    #[tokio::test]
    async fn test_bulk_coalesces_over_http() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/endpoint/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"method": "get", "path": "user/1", "status": 200, "data": {"id": 1}},
                {"method": "get", "path": "user/2", "status": 200, "data": {"id": 2}}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let connector = ApiConnector::from_config(config(&mock_server)).unwrap();
        let first = connector.bulk(LogicalRequest::get("user/1"));
        let second = connector.bulk(LogicalRequest::get("user/2"));

        assert_eq!(first.await.unwrap().data, json!({"id": 1}));
        assert_eq!(second.await.unwrap().data, json!({"id": 2}));
        assert_eq!(connector.stats().batches_sent, 1);
    }

    #[tokio::test]
    async fn test_bulk_raw_transactional_returns_unvalidated_items() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/endpoint/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"status": 201, "data": {"id": 7}},
                {"status": 404, "data": {"detail": "missing"}}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let connector = ApiConnector::from_config(config(&mock_server)).unwrap();
        let items = connector
            .bulk_raw(
                vec![
                    LogicalRequest::post("user", json!({"name": "x"})),
                    LogicalRequest::delete("user/9"),
                ],
                BulkMode::Transactional,
                false,
            )
            .await
            .unwrap();

        assert_eq!(items[0].status, 201);
        assert_eq!(items[1].status, 404);
    }

    #[tokio::test]
    async fn test_bulk_raw_force_auth_uses_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"status": 200, "data": 1}])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = config(&mock_server);
        config.auth_token = Some("abc".to_string());
        let connector = ApiConnector::from_config(config).unwrap();

        let items = connector
            .bulk_raw(vec![LogicalRequest::get("me")], BulkMode::Simple, true)
            .await
            .unwrap();
        assert_eq!(items[0].data, json!(1));
    }

    #[test]
    fn test_init_purges_other_versions() {
        let store = Arc::new(MemoryStore::new());
        for partition in ["etags-cache-1", "etags-cache-2"] {
            store
                .put(
                    CacheKey::new(partition, "GET user/"),
                    CacheRecord {
                        signature: "GET user/".to_string(),
                        etag: "e".to_string(),
                        status: 200,
                        body: json!([]),
                        headers: Headers::new(),
                        stored_at: 0,
                    },
                )
                .unwrap();
        }

        let mut config = ConnectorConfig::new("http://bulk.test/api/endpoint/");
        config.cache.version_tag = "2".to_string();
        let public: Arc<dyn Transport> =
            Arc::new(HttpTransport::new("batchway-test", &Default::default()).unwrap());
        let shared: Arc<dyn CacheStore> = store.clone();
        let connector = ApiConnector::with_parts(config, public, None, Some(shared)).unwrap();

        assert_eq!(connector.init(), 1);
        assert_eq!(store.partitions().unwrap(), vec!["etags-cache-2"]);
    }

    #[test]
    fn test_disabled_cache_has_no_overlay() {
        let mut config = ConnectorConfig::new("http://bulk.test/api/endpoint/");
        config.cache.enabled = false;
        let connector = ApiConnector::from_config(config).unwrap();

        assert!(connector.overlay().is_none());
        assert!(connector.cache_stats().is_none());
        assert_eq!(connector.init(), 0);
    }
}
