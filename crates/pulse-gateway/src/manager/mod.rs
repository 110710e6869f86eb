//! Shard manager
//!
//! Owns the shard fleet: assigns (shard id, shard count) pairs, staggers
//! startup so the remote connection-rate protections are not tripped,
//! restarts shards that fail retryably with its own backoff, and tears
//! everything down through one shutdown signal.

use crate::dispatch::EventDispatcher;
use crate::error::GatewayError;
use crate::shard::{ShardSession, ShardState, ShardStatus};
use crate::transport::{TransportFactory, WebSocketFactory};
use futures::future::select_all;
use parking_lot::Mutex;
use pulse_common::{ClientConfig, ExponentialBackoff};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Point-in-time view of one shard, for diagnostics
#[derive(Debug, Clone)]
pub struct ShardLiveness {
    pub shard_id: u32,
    pub state: ShardState,
    pub last_sequence: Option<u64>,
    pub has_session: bool,
}

/// Supervises the shard fleet
pub struct ShardManager {
    config: Arc<ClientConfig>,
    dispatcher: Arc<EventDispatcher>,
    factory: Arc<dyn TransportFactory>,
    statuses: Mutex<Vec<Arc<ShardStatus>>>,
    tasks: Mutex<Vec<JoinHandle<Result<(), GatewayError>>>>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

impl ShardManager {
    /// Create a manager connecting over WebSockets
    #[must_use]
    pub fn new(config: Arc<ClientConfig>, dispatcher: Arc<EventDispatcher>) -> Self {
        Self::with_factory(config, dispatcher, Arc::new(WebSocketFactory))
    }

    /// Create a manager over a custom transport factory
    #[must_use]
    pub fn with_factory(
        config: Arc<ClientConfig>,
        dispatcher: Arc<EventDispatcher>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            dispatcher,
            factory,
            statuses: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            shutdown,
            started: AtomicBool::new(false),
        }
    }

    /// Start every shard
    ///
    /// Shards launch as independent tasks; this only paces their starts
    /// by the configured stagger interval, it never waits for a shard to
    /// become ready.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Shard manager is already started");
            return;
        }

        let count = self.config.shard_count;
        tracing::info!(shard_count = count, "Starting shards");

        for shard_id in 0..count {
            if shard_id > 0 {
                tokio::time::sleep(self.config.shard_start_interval).await;
            }
            if *self.shutdown.borrow() {
                break;
            }
            self.spawn_shard(shard_id);
        }
    }

    /// Spawn one shard with its supervision loop
    fn spawn_shard(&self, shard_id: u32) {
        let config = self.config.clone();
        let dispatcher = self.dispatcher.clone();
        let factory = self.factory.clone();
        let shutdown = self.shutdown.subscribe();
        let status = ShardStatus::new(shard_id);
        self.statuses.lock().push(status.clone());

        let task = tokio::spawn(async move {
            let mut restart = ExponentialBackoff::new(config.restart.clone());

            loop {
                let session = ShardSession::new(
                    shard_id,
                    config.clone(),
                    dispatcher.clone(),
                    factory.clone(),
                    status.clone(),
                    shutdown.clone(),
                );

                match session.run().await {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_retryable() => {
                        let delay = restart.next_delay().unwrap_or(config.restart.max_delay);
                        tracing::warn!(
                            shard_id = shard_id,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "Shard failed, restarting"
                        );
                        let mut shutdown = shutdown.clone();
                        tokio::select! {
                            () = wait_for_shutdown(&mut shutdown) => return Ok(()),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    Err(e) => {
                        tracing::error!(shard_id = shard_id, error = %e, "Shard failed fatally");
                        return Err(e);
                    }
                }
            }
        });

        self.tasks.lock().push(task);
    }

    /// Wait for the fleet to finish
    ///
    /// Returns on clean shutdown, or with the first non-retryable shard
    /// error after signaling the remaining shards to stop.
    pub async fn join(&self) -> Result<(), GatewayError> {
        let mut tasks: Vec<_> = self.tasks.lock().drain(..).collect();

        while !tasks.is_empty() {
            let (result, _, rest) = select_all(tasks).await;
            tasks = rest;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // One shard is unrecoverable; take the fleet down with it
                    let _ = self.shutdown.send(true);
                    for task in tasks {
                        let _ = task.await;
                    }
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Shard task aborted unexpectedly");
                }
            }
        }
        Ok(())
    }

    /// Stop every shard and wait for their connections to close
    ///
    /// Signals shutdown once; each session cancels its pending timers and
    /// backoffs and closes its transport on the way out, on every exit
    /// path.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down shard manager");
        let _ = self.shutdown.send(true);

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Shard ended with error during shutdown"),
                Err(e) => tracing::warn!(error = %e, "Shard task aborted during shutdown"),
            }
        }

        self.started.store(false, Ordering::SeqCst);
        tracing::info!("Shard manager stopped");
    }

    /// Read-only liveness view over the fleet
    #[must_use]
    pub fn liveness(&self) -> Vec<ShardLiveness> {
        self.statuses
            .lock()
            .iter()
            .map(|status| ShardLiveness {
                shard_id: status.shard_id(),
                state: status.state(),
                last_sequence: status.last_sequence(),
                has_session: status.has_session(),
            })
            .collect()
    }

    /// Number of shards whose session is currently established
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.statuses.lock().iter().filter(|s| s.is_ready()).count()
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("shard_count", &self.config.shard_count)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
