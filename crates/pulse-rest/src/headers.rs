//! Rate-limit header parsing
//!
//! The server describes bucket identity and quota in response headers.
//! Header names are configuration constants; absent or malformed values
//! parse to `None` rather than failing the request.

use http::HeaderMap;
use std::time::Duration;

/// Server-assigned bucket identity
pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
/// Total quota in the current window
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
/// Requests left in the current window
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Seconds until the window resets (fractional)
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Present when a throttle applies to the global ceiling
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";
/// Seconds to wait before retrying a throttled request
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Parsed view of the rate-limit headers on one response
#[derive(Debug, Clone, Default)]
pub struct RateLimitHeaders {
    /// Bucket id the route belongs to
    pub bucket: Option<String>,
    /// Total quota for the bucket
    pub limit: Option<u32>,
    /// Remaining quota after this request
    pub remaining: Option<u32>,
    /// Time until the bucket resets
    pub reset_after: Option<Duration>,
    /// Server-mandated wait before retrying (throttle responses)
    pub retry_after: Option<Duration>,
    /// Whether a throttle counts against the global ceiling
    pub global: bool,
}

impl RateLimitHeaders {
    /// Parse the rate-limit headers out of a response header map
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        Self {
            bucket: string_header(headers, HEADER_BUCKET),
            limit: number_header(headers, HEADER_LIMIT),
            remaining: number_header(headers, HEADER_REMAINING),
            reset_after: seconds_header(headers, HEADER_RESET_AFTER),
            retry_after: seconds_header(headers, HEADER_RETRY_AFTER),
            global: headers.contains_key(HEADER_GLOBAL),
        }
    }

    /// Check if any quota information was present at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bucket.is_none()
            && self.limit.is_none()
            && self.remaining.is_none()
            && self.reset_after.is_none()
            && self.retry_after.is_none()
            && !self.global
    }
}

fn string_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn number_header(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

fn seconds_header(headers: &HeaderMap, name: &str) -> Option<Duration> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|secs| *secs >= 0.0)
        .map(Duration::from_secs_f64)
}
