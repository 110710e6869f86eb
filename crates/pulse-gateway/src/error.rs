//! Gateway error types

use pulse_core::{CloseCode, ProtocolError};

/// Errors surfaced by gateway sessions
///
/// Transient failures (dropped connections, heartbeat timeouts) are
/// recovered inside the session and never reach this type; what does
/// reach it could not be resolved by reconnect/resume logic.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport-level connect/read/write failure
    #[error("transport failure")]
    Transport(#[source] anyhow::Error),

    /// Malformed or unexpected frame
    #[error("protocol violation")]
    Protocol(#[from] ProtocolError),

    /// The gateway rejected our credentials
    #[error("authentication rejected: {0}")]
    Auth(CloseCode),

    /// The gateway closed the connection with a non-recoverable code
    #[error("fatal close: {0}")]
    Fatal(CloseCode),

    /// Connect retries exhausted without establishing a session
    #[error("gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl GatewayError {
    /// Check if restarting the shard could help
    ///
    /// Bad credentials or a rejected shard configuration fail the same
    /// way on every attempt; those propagate instead of restarting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth(_) | Self::Fatal(_))
    }

    pub(crate) fn transport(source: impl Into<anyhow::Error>) -> Self {
        Self::Transport(source.into())
    }
}
