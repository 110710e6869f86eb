//! WebSocket transport
//!
//! Production implementation of the transport seam over
//! `tokio-tungstenite`.

use super::{GatewayTransport, TransportEvent, TransportFactory};
use crate::error::GatewayError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pulse_core::GatewayMessage;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// A connected WebSocket gateway transport
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewayTransport for WebSocketTransport {
    async fn send(&mut self, message: GatewayMessage) -> Result<(), GatewayError> {
        let json = message.to_json().map_err(GatewayError::transport)?;
        self.stream
            .send(WsMessage::Text(json))
            .await
            .map_err(GatewayError::transport)
    }

    async fn next_event(&mut self) -> Result<TransportEvent, GatewayError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(TransportEvent::Message(GatewayMessage::from_json(&text)?));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    let message =
                        serde_json::from_slice(&bytes).map_err(pulse_core::ProtocolError::from)?;
                    return Ok(TransportEvent::Message(message));
                }
                // Pings are answered by the library on the next flush
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(frame))) => {
                    return Ok(TransportEvent::Closed(frame.map(|f| u16::from(f.code))));
                }
                Some(Err(e)) => return Err(GatewayError::transport(e)),
                None => return Ok(TransportEvent::Closed(None)),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Connects WebSocket transports
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

#[async_trait]
impl TransportFactory for WebSocketFactory {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayTransport>, GatewayError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(GatewayError::transport)?;

        tracing::debug!(url = %url, "Gateway transport connected");

        Ok(Box::new(WebSocketTransport { stream }))
    }
}
