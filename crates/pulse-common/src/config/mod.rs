//! Client configuration
//!
//! Loads configuration from environment variables, with defaults suitable
//! for a single-shard client.

mod client_config;

pub use client_config::{ClientConfig, ConfigError, RestConfig, Token};
