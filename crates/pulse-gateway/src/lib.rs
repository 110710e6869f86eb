//! # pulse-gateway
//!
//! Client side of the push gateway: sharded sessions with
//! identify/resume/heartbeat lifecycle, a supervising shard manager, and
//! an ordered event dispatcher feeding registered listeners.

pub mod dispatch;
pub mod error;
pub mod manager;
pub mod shard;
pub mod transport;

pub use dispatch::{EventDispatcher, ListenerHandle};
pub use error::GatewayError;
pub use manager::{ShardLiveness, ShardManager};
pub use shard::{ShardSession, ShardState, ShardStatus};
pub use transport::{GatewayTransport, TransportEvent, TransportFactory, WebSocketFactory};
