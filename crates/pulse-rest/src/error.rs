//! REST error types
//!
//! Every failure surfaces to the immediate caller; nothing below this
//! layer swallows an error on the caller's behalf.

use http::{Method, StatusCode};

/// Errors returned by the REST dispatcher
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The request could not be delivered and provably had no effect
    #[error("transport error")]
    Transport(#[source] anyhow::Error),

    /// A state-changing request failed with its server-side outcome unknown
    ///
    /// Never retried automatically; the caller decides whether a replay
    /// is safe.
    #[error("outcome of {method} {path} is unknown")]
    AmbiguousOutcome {
        method: Method,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    /// Throttled past the retry budget
    #[error("rate limited after {retries} retries")]
    RateLimitExceeded {
        retries: u32,
        bucket: Option<String>,
    },

    /// Non-success response other than a throttle
    #[error("request failed with status {status}")]
    RequestFailed { status: StatusCode, body: String },

    /// Response body did not match the expected shape
    #[error("failed to decode response body")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    /// Check if the failure was a client-side mistake (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::RequestFailed { status, .. } if status.is_client_error())
    }

    /// Check if the server reported an internal failure (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::RequestFailed { status, .. } if status.is_server_error())
    }

    /// Status code of the failed response, when there was one
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            Self::RateLimitExceeded { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            _ => None,
        }
    }
}

/// Result type alias for REST operations
pub type RestResult<T> = Result<T, RestError>;
