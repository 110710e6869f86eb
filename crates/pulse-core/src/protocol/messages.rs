//! Gateway message frame
//!
//! Every frame on the gateway connection uses the same envelope: an op
//! code, and for dispatches an event name and sequence number.

use super::{HelloPayload, IdentifyPayload, OpCode, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors produced while decoding inbound frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame is missing its data payload (op {0})")]
    MissingData(OpCode),

    #[error("unexpected frame: {0}")]
    Unexpected(String),
}

/// Gateway message frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event name (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Data payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    // === Outbound frames ===

    /// Create an Identify frame (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self {
            op: OpCode::Identify,
            t: None,
            s: None,
            d: serde_json::to_value(payload).ok(),
        }
    }

    /// Create a Resume frame (op=4)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self {
            op: OpCode::Resume,
            t: None,
            s: None,
            d: serde_json::to_value(payload).ok(),
        }
    }

    /// Create a Heartbeat frame (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            op: OpCode::Heartbeat,
            t: None,
            s: None,
            d: Some(last_sequence.map_or(Value::Null, |s| Value::Number(s.into()))),
        }
    }

    // === Inbound frame accessors ===

    /// Decode the Hello payload (op=10)
    pub fn as_hello(&self) -> Result<HelloPayload, ProtocolError> {
        if self.op != OpCode::Hello {
            return Err(ProtocolError::Unexpected(format!("expected Hello, got {}", self.op)));
        }
        let data = self.d.as_ref().ok_or(ProtocolError::MissingData(OpCode::Hello))?;
        Ok(serde_json::from_value(data.clone())?)
    }

    /// Get the resumable flag of an Invalid Session frame (op=7)
    ///
    /// Defaults to false when the payload is absent or not a boolean.
    #[must_use]
    pub fn invalid_session_resumable(&self) -> bool {
        self.op == OpCode::InvalidSession
            && self.d.as_ref().and_then(Value::as_bool).unwrap_or(false)
    }

    /// Check if this frame is a dispatch carrying the given event name
    #[must_use]
    pub fn is_dispatch(&self, event_name: &str) -> bool {
        self.op == OpCode::Dispatch && self.t.as_deref() == Some(event_name)
    }

    // === Utilities ===

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
