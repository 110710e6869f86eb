//! Telemetry setup
//!
//! Configures the `tracing` subscriber for applications embedding the
//! client.

mod tracing_setup;

pub use tracing_setup::{
    init_tracing, init_tracing_with_config, try_init_tracing, TracingConfig, TracingError,
};
