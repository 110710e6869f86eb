//! # pulse-common
//!
//! Shared ambient concerns for the pulse client: configuration loading,
//! tracing setup, and reconnect backoff.

pub mod backoff;
pub mod config;
pub mod telemetry;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use config::{ClientConfig, ConfigError, RestConfig, Token};
pub use telemetry::{init_tracing, init_tracing_with_config, TracingConfig};
