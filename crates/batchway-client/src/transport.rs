//! Wire-level transports for bulk calls.
//!
//! A [`Transport`] performs exactly one outer HTTP call carrying an encoded
//! request array. [`HttpTransport`] does so with `reqwest`;
//! [`AuthenticatedTransport`] decorates any transport with credentials
//! obtained from a [`TokenProvider`].

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use batchway_types::BulkMode;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// One outer bulk call, ready to be transmitted.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    /// Transmission mode, selecting the outer verb.
    pub mode: BulkMode,
    /// Bulk endpoint.
    pub endpoint: Url,
    /// Extra headers of the outer call.
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded request array.
    pub body: Bytes,
}

/// Raw answer to an outer bulk call.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Outer HTTP status.
    pub status: u16,
    /// Raw body.
    pub body: Bytes,
}

/// Performs one wire-level bulk call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmits `batch` and returns the raw answer.
    async fn send(&self, batch: OutboundBatch) -> TransportResult<TransportResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, batch: OutboundBatch) -> TransportResult<TransportResponse> {
        (**self).send(batch).await
    }
}

/// Supplies the `Authorization` header value for authenticated batches.
///
/// Token acquisition and refresh live behind this trait.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a currently valid `Authorization` header value.
    async fn authorization(&self) -> TransportResult<String>;
}

/// A fixed bearer token.
#[derive(Clone)]
pub struct StaticToken {
    value: String,
}

impl StaticToken {
    /// Creates a provider answering `Bearer {token}`.
    pub fn bearer(token: impl AsRef<str>) -> Self {
        Self {
            value: format!("Bearer {}", token.as_ref()),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn authorization(&self) -> TransportResult<String> {
        Ok(self.value.clone())
    }
}

/// Bulk transport over `reqwest`.
///
/// The client is cheaply cloneable and can be shared across connectors.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Creates a transport sending `user_agent` and `default_headers` on every call.
    ///
    /// No request timeout is set: timeouts are a caller concern.
    pub fn new(
        user_agent: &str,
        default_headers: &BTreeMap<String, String>,
    ) -> TransportResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Encode(format!("header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Encode(format!("header value for {name}: {e}")))?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: OutboundBatch) -> TransportResult<TransportResponse> {
        let method = Method::from_bytes(batch.mode.outer_method().as_upper().as_bytes())
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let mut request = self
            .http
            .request(method, batch.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(batch.body);
        for (name, value) in &batch.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(TransportResponse { status, body })
    }
}

/// Adds an `Authorization` header from a [`TokenProvider`] to every call.
pub struct AuthenticatedTransport<T> {
    inner: T,
    tokens: Arc<dyn TokenProvider>,
}

impl<T> AuthenticatedTransport<T> {
    /// Decorates `inner` with credentials from `tokens`.
    pub fn new(inner: T, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { inner, tokens }
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthenticatedTransport<T> {
    async fn send(&self, mut batch: OutboundBatch) -> TransportResult<TransportResponse> {
        let authorization = self.tokens.authorization().await?;
        batch
            .headers
            .insert(AUTHORIZATION.as_str().to_string(), authorization);
        self.inner.send(batch).await
    }
}
