//! Shared helpers for integration tests

use pulse_common::{BackoffConfig, ClientConfig};
use std::time::Duration;

/// Client configuration tuned for fast, deterministic tests
///
/// Backoffs are short and jitter-free so paused-clock tests advance
/// through reconnects quickly and predictably.
#[must_use]
pub fn test_config() -> ClientConfig {
    let fast_backoff = BackoffConfig {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        factor: 2.0,
        jitter: 0.0,
        max_attempts: Some(5),
    };

    let mut config = ClientConfig::new("test-token");
    config.hello_timeout = Duration::from_millis(500);
    config.shard_start_interval = Duration::from_millis(10);
    config.reconnect = fast_backoff.clone();
    config.restart = BackoffConfig {
        max_attempts: None,
        ..fast_backoff
    };
    config
}

/// Poll a condition until it holds or the (virtual) timeout elapses
pub async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
