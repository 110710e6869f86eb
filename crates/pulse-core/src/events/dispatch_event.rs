//! Decoded dispatch event
//!
//! The unit handed to listeners: event name, raw payload, and the shard
//! it arrived on. Immutable once constructed.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Listener key matching every dispatched event
///
/// Listeners registered under this key run after the named listeners for
/// each event, control frames included.
pub const ANY_EVENT: &str = "*";

/// A decoded inbound event
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    inner: Arc<EventInner>,
}

#[derive(Debug)]
struct EventInner {
    name: String,
    payload: Value,
    shard_id: u32,
    sequence: Option<u64>,
    received_at: DateTime<Utc>,
}

impl DispatchEvent {
    /// Create a new event
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value, shard_id: u32, sequence: Option<u64>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                name: name.into(),
                payload,
                shard_id,
                sequence,
                received_at: Utc::now(),
            }),
        }
    }

    /// Event name (the `t` field for dispatches, the op name for control frames)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Raw payload
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.inner.payload
    }

    /// Shard the event arrived on
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.inner.shard_id
    }

    /// Sequence number, if the frame was sequenced
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.inner.sequence
    }

    /// When the event was decoded
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.inner.received_at
    }
}

impl std::fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchEvent({}, shard={}", self.name(), self.shard_id())?;
        if let Some(s) = self.sequence() {
            write!(f, ", s={s}")?;
        }
        write!(f, ")")
    }
}
