//! Event dispatcher
//!
//! An explicit ordered registry of listeners keyed by event name.
//! Registration order defines invocation order; listeners under the
//! catch-all key run after the named listeners for every event. A failing
//! listener is reported and never stops its siblings or the shard that
//! produced the event.

use parking_lot::RwLock;
use pulse_core::{DispatchEvent, ANY_EVENT};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type ListenerFn = dyn Fn(&DispatchEvent) -> anyhow::Result<()> + Send + Sync;

/// Token returned by [`EventDispatcher::register`], used to unregister
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    key: String,
    id: Uuid,
}

impl ListenerHandle {
    /// Event key the listener was registered under
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Routes decoded events to registered listeners
///
/// The registry is read-mostly: dispatching takes a read lock and clones
/// the listener list, so a slow listener never blocks registration.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<(Uuid, Arc<ListenerFn>)>>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty dispatcher wrapped in Arc
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a listener for an event key
    ///
    /// Listeners for one key run in the order they were registered. Use
    /// [`ANY_EVENT`] to observe every dispatched event, control frames
    /// included.
    pub fn register<F>(&self, key: impl Into<String>, listener: F) -> ListenerHandle
    where
        F: Fn(&DispatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let key = key.into();
        let id = Uuid::new_v4();

        self.listeners
            .write()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(listener)));

        tracing::debug!(key = %key, "Listener registered");

        ListenerHandle { key, id }
    }

    /// Remove a previously registered listener
    ///
    /// Returns false if the handle was already unregistered.
    pub fn unregister(&self, handle: &ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&handle.key) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(id, _)| *id != handle.id);
        let removed = entries.len() < before;

        if entries.is_empty() {
            listeners.remove(&handle.key);
        }
        removed
    }

    /// Invoke every listener interested in this event
    ///
    /// Named listeners run first in registration order, then catch-all
    /// listeners. Failures are logged and isolated.
    pub fn notify(&self, event: &DispatchEvent) {
        let interested: Vec<(Uuid, Arc<ListenerFn>)> = {
            let listeners = self.listeners.read();
            let mut interested: Vec<(Uuid, Arc<ListenerFn>)> =
                listeners.get(event.name()).into_iter().flatten().cloned().collect();
            if event.name() != ANY_EVENT {
                if let Some(catch_all) = listeners.get(ANY_EVENT) {
                    interested.extend(catch_all.iter().cloned());
                }
            }
            interested
        };

        tracing::trace!(
            event = %event.name(),
            shard_id = event.shard_id(),
            listeners = interested.len(),
            "Dispatching event"
        );

        for (id, listener) in interested {
            if let Err(e) = listener(event) {
                tracing::error!(
                    event = %event.name(),
                    listener = %id,
                    error = %e,
                    "Listener failed"
                );
            }
        }
    }

    /// Number of listeners registered for a key
    #[must_use]
    pub fn listener_count(&self, key: &str) -> usize {
        self.listeners.read().get(key).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("keys", &self.listeners.read().len())
            .finish()
    }
}
