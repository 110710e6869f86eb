//! Request executor
//!
//! Performs one logical request under full rate-limit discipline: global
//! ceiling, per-bucket quota and serialization, and bounded retries when
//! the server throttles.

use crate::client::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{RestError, RestResult};
use crate::headers::RateLimitHeaders;
use crate::limit::{BucketRegistry, GlobalRateState};
use crate::route::Route;
use http::StatusCode;
use pulse_common::RestConfig;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Fallback wait when a throttle response omits its retry delay
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Executes requests one at a time per bucket
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    buckets: BucketRegistry,
    global: GlobalRateState,
    base_url: String,
    max_retries: u32,
}

impl RequestExecutor {
    /// Create an executor over the given transport
    #[must_use]
    pub fn new(config: &RestConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            buckets: BucketRegistry::new(),
            global: GlobalRateState::new(config.global_per_second),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        }
    }

    /// Perform one logical request
    ///
    /// Quota waits happen before the request is issued; the bucket stays
    /// reserved until the final outcome so concurrent requests on the
    /// same bucket never race on stale quota.
    pub async fn perform(&self, route: &Route, body: Option<Value>) -> RestResult<HttpResponse> {
        self.global.acquire().await;

        let mut permit = self.buckets.acquire(route).await;
        if let Some(wait) = permit.ready_in() {
            tracing::debug!(
                route = %route,
                bucket = %permit.bucket_id(),
                wait_ms = wait.as_millis() as u64,
                "Bucket exhausted, waiting for reset"
            );
            tokio::time::sleep(wait).await;
            permit.refill();
        }
        permit.consume();

        let request = HttpRequest {
            method: route.method().clone(),
            url: format!("{}{}", self.base_url, route.path()),
            body,
        };

        let mut retries = 0u32;
        loop {
            let response = match self.transport.perform(&request).await {
                Ok(response) => response,
                Err(source) => {
                    // The server may or may not have seen the request; a
                    // state-changing call is never replayed on a guess.
                    return Err(if route.is_side_effecting() {
                        RestError::AmbiguousOutcome {
                            method: route.method().clone(),
                            path: route.path(),
                            source,
                        }
                    } else {
                        RestError::Transport(source)
                    });
                }
            };

            let limits = RateLimitHeaders::parse(&response.headers);
            self.buckets.record(route, &mut permit, &limits);

            if response.status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.max_retries {
                    tracing::warn!(
                        route = %route,
                        retries = retries,
                        "Retry budget exhausted, surfacing rate limit"
                    );
                    return Err(RestError::RateLimitExceeded {
                        retries,
                        bucket: limits.bucket,
                    });
                }
                retries += 1;

                let delay = limits
                    .retry_after
                    .or(limits.reset_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                if limits.global {
                    self.global.lock_until(Instant::now() + delay).await;
                }

                tracing::debug!(
                    route = %route,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    global = limits.global,
                    "Throttled, honoring server retry delay"
                );
                tokio::time::sleep(delay).await;
                permit.refill();
                permit.consume();
                continue;
            }

            if response.status.is_success() {
                tracing::trace!(route = %route, status = %response.status, "Request completed");
                return Ok(response);
            }

            return Err(RestError::RequestFailed {
                status: response.status,
                body: response.body,
            });
        }
    }

    /// Drop rate-limit buckets idle for longer than `max_idle`
    pub fn evict_idle_buckets(&self, max_idle: Duration) -> usize {
        self.buckets.evict_idle(max_idle)
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("buckets", &self.buckets.bucket_count())
            .finish()
    }
}
