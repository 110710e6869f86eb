//! Shard status snapshot
//!
//! Lock-free view of a session's lifecycle shared with the supervisor.
//! The session is the only writer; the supervisor and diagnostics only
//! read.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle state of a shard session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShardState {
    /// No connection and none being attempted
    Disconnected = 0,
    /// Transport connection in progress
    Connecting = 1,
    /// Connected, exchanging hello/identify frames
    Handshaking = 2,
    /// Session established, events flowing
    Ready = 3,
    /// Reconnected and attempting to resume the previous session
    Resuming = 4,
    /// Connection lost, waiting to reconnect
    Reconnecting = 5,
    /// Shut down for good
    Closed = 6,
}

impl ShardState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Handshaking,
            3 => Self::Ready,
            4 => Self::Resuming,
            5 => Self::Reconnecting,
            6 => Self::Closed,
            _ => Self::Disconnected,
        }
    }

    /// Get the name of this state
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Handshaking => "Handshaking",
            Self::Ready => "Ready",
            Self::Resuming => "Resuming",
            Self::Reconnecting => "Reconnecting",
            Self::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for ShardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared snapshot of one shard's session state
#[derive(Debug)]
pub struct ShardStatus {
    shard_id: u32,
    state: AtomicU8,
    /// Last recorded sequence; -1 while none has been seen
    last_sequence: AtomicI64,
    has_session: AtomicBool,
}

impl ShardStatus {
    /// Create a fresh status for a shard slot
    #[must_use]
    pub fn new(shard_id: u32) -> Arc<Self> {
        Arc::new(Self {
            shard_id,
            state: AtomicU8::new(ShardState::Disconnected as u8),
            last_sequence: AtomicI64::new(-1),
            has_session: AtomicBool::new(false),
        })
    }

    /// Shard this status belongs to
    #[must_use]
    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ShardState {
        ShardState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Check if the session is established and receiving events
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ShardState::Ready
    }

    /// Last recorded sequence number, if any dispatch has been seen
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        let raw = self.last_sequence.load(Ordering::SeqCst);
        u64::try_from(raw).ok()
    }

    /// Check if a resumable session id is held
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.has_session.load(Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, state: ShardState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn set_sequence(&self, sequence: u64) {
        self.last_sequence
            .store(i64::try_from(sequence).unwrap_or(i64::MAX), Ordering::SeqCst);
    }

    pub(crate) fn set_has_session(&self, value: bool) {
        self.has_session.store(value, Ordering::SeqCst);
    }

    pub(crate) fn clear_session(&self) {
        self.has_session.store(false, Ordering::SeqCst);
        self.last_sequence.store(-1, Ordering::SeqCst);
    }
}
