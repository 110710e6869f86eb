//! Global rate state
//!
//! A single process-wide ceiling on request throughput, independent of
//! per-bucket quotas. Constructed explicitly and shared by handle; only
//! the request executor mutates it.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    remaining: u32,
    reset_at: Instant,
    /// Hard lockout applied when the server throttles globally
    locked_until: Option<Instant>,
}

/// Process-wide request ceiling
#[derive(Debug)]
pub struct GlobalRateState {
    limit: u32,
    window: Mutex<Window>,
}

impl GlobalRateState {
    /// Create a ceiling of `limit` requests per one-second window
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            window: Mutex::new(Window {
                remaining: limit.max(1),
                reset_at: Instant::now() + WINDOW,
                locked_until: None,
            }),
        }
    }

    /// Take one unit of global quota, waiting out the window if exhausted
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                if let Some(until) = window.locked_until {
                    if until > now {
                        Some(until - now)
                    } else {
                        window.locked_until = None;
                        continue;
                    }
                } else {
                    if now >= window.reset_at {
                        window.remaining = self.limit;
                        window.reset_at = now + WINDOW;
                    }
                    if window.remaining > 0 {
                        window.remaining -= 1;
                        return;
                    }
                    Some(window.reset_at - now)
                }
            };

            if let Some(wait) = wait {
                tracing::trace!(wait_ms = wait.as_millis() as u64, "Global ceiling reached, waiting");
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// Lock all requests out until the given deadline
    ///
    /// Applied when a throttle response is flagged as global. A later
    /// deadline never shrinks an existing lockout.
    pub async fn lock_until(&self, deadline: Instant) {
        let mut window = self.window.lock().await;
        window.locked_until = Some(match window.locked_until {
            Some(existing) if existing > deadline => existing,
            _ => deadline,
        });

        tracing::warn!("Global rate limit hit, requests locked out");
    }
}
