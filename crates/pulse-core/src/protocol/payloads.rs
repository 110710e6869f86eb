//! Handshake payload definitions
//!
//! Payload structures for the frames exchanged while a session is being
//! established or resumed.

use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// First frame the server sends after the transport connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
///
/// Authenticates a fresh session and claims a shard slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Shard slot as `[shard_id, shard_count]`
    pub shard: [u32; 2],

    /// Optional client properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IdentifyProperties>,
}

/// Client connection properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Browser or client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    /// Device type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl IdentifyProperties {
    /// Properties describing this library
    #[must_use]
    pub fn library_defaults() -> Self {
        Self {
            os: Some(std::env::consts::OS.to_string()),
            browser: Some("pulse".to_string()),
            device: Some("pulse".to_string()),
        }
    }
}

/// Payload for op 4 (Resume)
///
/// Reclaims a dropped session so only missed events are replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Fields of the READY dispatch the runtime needs
///
/// The full READY body carries the current user and guild list; those are
/// consumed by higher layers through the dispatcher. Unknown fields are
/// ignored so protocol additions do not break the handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// Gateway protocol version
    #[serde(default)]
    pub v: i32,

    /// Session ID for resuming
    pub session_id: String,

    /// Gateway URL to reconnect to for resuming
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
}
