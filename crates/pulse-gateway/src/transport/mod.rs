//! Gateway transport seam
//!
//! Sessions talk to the wire through these traits; production connects a
//! WebSocket, tests substitute scripted transports.

mod websocket;

use crate::error::GatewayError;
use async_trait::async_trait;
use pulse_core::GatewayMessage;

pub use websocket::{WebSocketFactory, WebSocketTransport};

/// Something the transport produced
#[derive(Debug)]
pub enum TransportEvent {
    /// A decoded gateway frame
    Message(GatewayMessage),
    /// The peer closed the connection, with the close code if one was sent
    Closed(Option<u16>),
}

/// One live bidirectional connection
#[async_trait]
pub trait GatewayTransport: Send {
    /// Send one frame
    async fn send(&mut self, message: GatewayMessage) -> Result<(), GatewayError>;

    /// Wait for the next inbound event
    async fn next_event(&mut self) -> Result<TransportEvent, GatewayError>;

    /// Close the connection; safe to call more than once
    async fn close(&mut self);
}

/// Establishes transports for sessions
///
/// Each (re)connection attempt goes through the factory, so a session
/// never holds a stale connection across reconnects.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Connect to the gateway at `url`
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayTransport>, GatewayError>;
}
