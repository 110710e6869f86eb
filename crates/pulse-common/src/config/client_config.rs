//! Client configuration structs
//!
//! Configuration is constructed programmatically or loaded from
//! environment variables (a `.env` file is honored when present).

use crate::backoff::BackoffConfig;
use pulse_core::IdentifyProperties;
use std::env;
use std::time::Duration;

/// Authentication token
///
/// Wrapped so the credential never leaks through `Debug` output or logs.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Expose the raw credential for building auth payloads and headers
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

impl From<&str> for Token {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// REST dispatcher configuration
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL for the request/response API
    pub base_url: String,
    /// Process-wide request ceiling per one-second window
    pub global_per_second: u32,
    /// Retry budget for throttled requests
    pub max_retries: u32,
    /// Timeout applied to each individual request
    pub request_timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_rest_url(),
            global_per_second: default_global_per_second(),
            max_retries: default_max_retries(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Authentication token
    pub token: Token,
    /// Gateway URL to connect shards to
    pub gateway_url: String,
    /// Number of shards to run
    pub shard_count: u32,
    /// Minimum interval between successive shard starts
    pub shard_start_interval: Duration,
    /// How long to wait for the server's first frame after connecting
    pub hello_timeout: Duration,
    /// Reconnect backoff for each shard
    pub reconnect: BackoffConfig,
    /// Backoff applied by the supervisor when restarting a failed shard
    pub restart: BackoffConfig,
    /// Connection properties sent during identify
    pub identify_properties: IdentifyProperties,
    /// REST dispatcher settings
    pub rest: RestConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults for the given token
    #[must_use]
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            gateway_url: default_gateway_url(),
            shard_count: 1,
            shard_start_interval: default_shard_start_interval(),
            hello_timeout: Duration::from_secs(10),
            reconnect: BackoffConfig::default(),
            restart: BackoffConfig {
                max_attempts: None,
                ..BackoffConfig::default()
            },
            identify_properties: IdentifyProperties::library_defaults(),
            rest: RestConfig::default(),
        }
    }

    /// Set the number of shards
    #[must_use]
    pub fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }

    /// Set the gateway URL
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Set the REST base URL
    #[must_use]
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest.base_url = url.into();
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads `PULSE_TOKEN` (required), `PULSE_GATEWAY_URL`,
    /// `PULSE_REST_URL`, `PULSE_SHARD_COUNT`, `PULSE_SHARD_START_INTERVAL_MS`,
    /// `PULSE_GLOBAL_PER_SECOND`, and `PULSE_MAX_RETRIES`.
    ///
    /// # Errors
    /// Returns an error if `PULSE_TOKEN` is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("PULSE_TOKEN").map_err(|_| ConfigError::MissingVar("PULSE_TOKEN"))?;
        let mut config = Self::new(Token::new(token));

        if let Ok(url) = env::var("PULSE_GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Ok(url) = env::var("PULSE_REST_URL") {
            config.rest.base_url = url;
        }
        if let Some(count) = env::var("PULSE_SHARD_COUNT").ok().and_then(|s| s.parse().ok()) {
            config.shard_count = count;
        }
        if let Some(ms) = env::var("PULSE_SHARD_START_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.shard_start_interval = Duration::from_millis(ms);
        }
        if let Some(limit) = env::var("PULSE_GLOBAL_PER_SECOND")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.rest.global_per_second = limit;
        }
        if let Some(retries) = env::var("PULSE_MAX_RETRIES").ok().and_then(|s| s.parse().ok()) {
            config.rest.max_retries = retries;
        }

        Ok(config)
    }
}

// Default value functions
fn default_gateway_url() -> String {
    "wss://gateway.pulse.local/gateway".to_string()
}

fn default_rest_url() -> String {
    "https://api.pulse.local/v1".to_string()
}

fn default_shard_start_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_global_per_second() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    5
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
