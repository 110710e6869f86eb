//! Exponential backoff with jitter
//!
//! Used for reconnect delays on the gateway side and for shard restart
//! pacing in the supervisor. Delays grow geometrically up to a cap and
//! are jittered so a fleet of shards does not reconnect in lockstep.

use rand::Rng;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// First delay
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub factor: f64,
    /// Jitter fraction in `0.0..=1.0`; 0 disables jitter, 1 draws the
    /// delay uniformly from `(0, computed]`
    pub jitter: f64,
    /// Attempt ceiling; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.5,
            max_attempts: Some(10),
        }
    }
}

/// Stateful backoff sequence
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a fresh sequence
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of delays handed out so far
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Next delay, or `None` once the attempt ceiling is exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let exp = self.config.base_delay.as_secs_f64() * self.config.factor.powi(self.attempt as i32);
        let capped = exp.min(self.config.max_delay.as_secs_f64());

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let delay = if jitter > 0.0 {
            let scale = 1.0 - jitter * rand::thread_rng().gen::<f64>();
            capped * scale
        } else {
            capped
        };

        self.attempt += 1;
        Some(Duration::from_secs_f64(delay))
    }

    /// Restart the sequence after a successful attempt
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
