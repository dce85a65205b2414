//! One wire-level transmission of a request array.

use crate::error::{TransportError, TransportResult};
use crate::transport::{OutboundBatch, Transport};
use batchway_types::{BatchResponseItem, BulkMode, LogicalRequest};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Sends request arrays to the bulk endpoint and parses the parallel answer.
#[derive(Clone)]
pub struct BatchSender {
    endpoint: Url,
    public: Arc<dyn Transport>,
    authenticated: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for BatchSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSender")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.authenticated.is_some())
            .finish()
    }
}

impl BatchSender {
    /// Creates a sender using `public` for every batch.
    pub fn new(endpoint: Url, public: Arc<dyn Transport>) -> Self {
        Self {
            endpoint,
            public,
            authenticated: None,
        }
    }

    /// Sets the transport used for batches that need credentials.
    pub fn with_authenticated(mut self, transport: Arc<dyn Transport>) -> Self {
        self.authenticated = Some(transport);
        self
    }

    /// Transmits `requests` in one outer call.
    ///
    /// The authenticated transport is used when `force_auth` is set or any
    /// request asks for it. On success the result holds exactly one item per
    /// request, in request order.
    pub async fn send(
        &self,
        requests: &[LogicalRequest],
        mode: BulkMode,
        force_auth: bool,
    ) -> TransportResult<Vec<BatchResponseItem>> {
        let needs_auth = force_auth || requests.iter().any(|r| r.requires_auth);
        let transport = if needs_auth {
            self.authenticated.as_ref().ok_or_else(|| {
                TransportError::Auth("no authenticated transport configured".to_string())
            })?
        } else {
            &self.public
        };

        let body =
            serde_json::to_vec(requests).map_err(|e| TransportError::Encode(e.to_string()))?;

        debug!(
            batch_size = requests.len(),
            mode = %mode,
            authenticated = needs_auth,
            "Sending bulk batch"
        );

        let response = transport
            .send(OutboundBatch {
                mode,
                endpoint: self.endpoint.clone(),
                headers: BTreeMap::new(),
                body: Bytes::from(body),
            })
            .await?;

        if !(200..300).contains(&response.status) {
            return Err(TransportError::Status {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let mut items: Vec<BatchResponseItem> = serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        if items.len() < requests.len() {
            return Err(TransportError::CountMismatch {
                expected: requests.len(),
                actual: items.len(),
            });
        }
        if items.len() > requests.len() {
            warn!(
                batch_size = requests.len(),
                received = items.len(),
                "Ignoring surplus bulk response items"
            );
            items.truncate(requests.len());
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AuthenticatedTransport, HttpTransport, StaticToken};
    use batchway_types::{PathSegment, RequestPath};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender(server: &MockServer) -> BatchSender {
        let endpoint = Url::parse(&format!("{}/api/endpoint/", server.uri())).unwrap();
        let http = HttpTransport::new("batchway-test", &BTreeMap::new()).unwrap();
        let auth = AuthenticatedTransport::new(http.clone(), Arc::new(StaticToken::bearer("t0k")));
        BatchSender::new(endpoint, Arc::new(http)).with_authenticated(Arc::new(auth))
    }

    #[tokio::test]
    async fn test_send_serializes_array_and_parses_items() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/endpoint/"))
            .and(body_json(json!([
                {"method": "get", "path": "user/1"},
                {"method": "post", "path": ["user", "2", "set_password"], "data": {"password": "x"}}
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"method": "get", "path": "user/1", "status": 200, "data": {"id": 1}},
                {"method": "post", "path": "user/2/set_password", "status": 400, "data": {"detail": "weak"}}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let requests = vec![
            LogicalRequest::get("user/1"),
            LogicalRequest::post(
                RequestPath::Segments(vec![
                    PathSegment::from("user"),
                    PathSegment::from(2i64),
                    PathSegment::from("set_password"),
                ]),
                json!({"password": "x"}),
            ),
        ];

        let items = sender(&mock_server)
            .send(&requests, BulkMode::Simple, false)
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].data, json!({"id": 1}));
        assert_eq!(items[1].status, 400);
    }

    #[tokio::test]
    async fn test_requires_auth_selects_authenticated_transport() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(header("authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"status": 200, "data": null},
                {"status": 200, "data": null}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let requests = vec![
            LogicalRequest::get("a"),
            LogicalRequest::get("b").with_auth(true),
        ];
        let items = sender(&mock_server)
            .send(&requests, BulkMode::Simple, false)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_authenticated_transport_is_auth_error() {
        let mock_server = MockServer::start().await;
        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let http = HttpTransport::new("batchway-test", &BTreeMap::new()).unwrap();
        let sender = BatchSender::new(endpoint, Arc::new(http));

        let result = sender
            .send(&[LogicalRequest::get("a")], BulkMode::Simple, true)
            .await;
        assert!(matches!(result, Err(TransportError::Auth(_))));
    }

    #[tokio::test]
    async fn test_short_response_is_count_mismatch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"status": 200, "data": 1}])),
            )
            .mount(&mock_server)
            .await;

        let requests = vec![LogicalRequest::get("a"), LogicalRequest::get("b")];
        let result = sender(&mock_server)
            .send(&requests, BulkMode::Simple, false)
            .await;

        assert!(matches!(
            result,
            Err(TransportError::CountMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_surplus_items_are_dropped() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"status": 200, "data": 1},
                {"status": 200, "data": 2}
            ])))
            .mount(&mock_server)
            .await;

        let items = sender(&mock_server)
            .send(&[LogicalRequest::get("a")], BulkMode::Simple, false)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, json!(1));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let result = sender(&mock_server)
            .send(&[LogicalRequest::get("a")], BulkMode::Simple, false)
            .await;
        assert!(matches!(result, Err(TransportError::Decode(_))));
    }

    #[tokio::test]
    async fn test_failed_transaction_is_status_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(502).set_body_json(json!([{"status": 409, "data": null}])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = sender(&mock_server)
            .send(&[LogicalRequest::delete("a/1")], BulkMode::Transactional, false)
            .await;
        assert!(matches!(result, Err(TransportError::Status { status: 502, .. })));
    }
}
