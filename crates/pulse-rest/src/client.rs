//! REST client
//!
//! The public entry point for outbound requests, plus the HTTP seam the
//! executor issues requests through. Callers go through
//! [`RestClient::submit`]; the bucket registry and global state stay
//! internal.

use crate::error::{RestError, RestResult};
use crate::executor::RequestExecutor;
use crate::route::Route;
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use pulse_common::{RestConfig, Token};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// One outbound HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// One HTTP response, body fully read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> RestResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Transport the executor issues requests through
///
/// Production uses [`ReqwestTransport`]; tests substitute scripted
/// implementations.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Deliver one request and read the full response
    async fn perform(&self, request: &HttpRequest) -> Result<HttpResponse, anyhow::Error>;
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
    token: Token,
}

impl ReqwestTransport {
    /// Build a transport with the configured request timeout
    pub fn new(config: &RestConfig, token: Token) -> RestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RestError::Transport(e.into()))?;

        Ok(Self { client, token })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn perform(&self, request: &HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(http::header::AUTHORIZATION, format!("Bearer {}", self.token.expose()));

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse { status, headers, body })
    }
}

/// Rate-limited REST dispatcher
///
/// Cheap to clone; all clones share the same bucket registry and global
/// rate state.
#[derive(Clone)]
pub struct RestClient {
    executor: Arc<RequestExecutor>,
}

impl RestClient {
    /// Create a client talking to the configured base URL
    pub fn new(config: &RestConfig, token: Token) -> RestResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config, token)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over a custom transport
    #[must_use]
    pub fn with_transport(config: &RestConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            executor: Arc::new(RequestExecutor::new(config, transport)),
        }
    }

    /// Submit a request and wait for its response
    ///
    /// Applies the full rate-limit discipline: global ceiling, per-bucket
    /// serialization and quota waits, and bounded retries on throttling.
    pub async fn submit(&self, route: &Route, body: Option<Value>) -> RestResult<HttpResponse> {
        self.executor.perform(route, body).await
    }

    /// Submit a request and decode the response body as JSON
    pub async fn submit_json<T: DeserializeOwned>(
        &self,
        route: &Route,
        body: Option<Value>,
    ) -> RestResult<T> {
        self.submit(route, body).await?.json()
    }

    /// Drop rate-limit buckets that have been idle for longer than `max_idle`
    ///
    /// Long-running hosts call this periodically; buckets reappear on the
    /// next request to their routes.
    pub fn evict_idle_buckets(&self, max_idle: std::time::Duration) -> usize {
        self.executor.evict_idle_buckets(max_idle)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient").finish()
    }
}
