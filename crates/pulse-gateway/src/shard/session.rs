//! Shard session state machine
//!
//! Drives one gateway connection through its whole life: wait for Hello,
//! identify or resume, heartbeat on the announced interval, track
//! sequences, classify disconnects, and reconnect with backoff. Transient
//! failures are absorbed here; only errors no reconnect can fix are
//! returned to the supervisor.

use crate::dispatch::EventDispatcher;
use crate::error::GatewayError;
use crate::shard::{ShardState, ShardStatus};
use crate::transport::{GatewayTransport, TransportEvent, TransportFactory};
use pulse_common::{ClientConfig, ExponentialBackoff};
use pulse_core::{
    CloseCode, DispatchEvent, EventType, GatewayMessage, IdentifyPayload, OpCode, ReadyPayload,
    ResumePayload,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// What ended one connection's lifetime
enum ConnectionOutcome {
    /// Shutdown was requested; do not reconnect
    Shutdown,
    /// Reconnect, resuming the session when `resumable` is true
    Reconnect { resumable: bool },
}

/// One shard's gateway session
pub struct ShardSession {
    shard_id: u32,
    config: Arc<ClientConfig>,
    dispatcher: Arc<EventDispatcher>,
    factory: Arc<dyn TransportFactory>,
    status: Arc<ShardStatus>,
    shutdown: watch::Receiver<bool>,
    session_id: Option<String>,
    last_sequence: Option<u64>,
}

impl ShardSession {
    /// Create a session for one shard slot
    ///
    /// The status handle outlives the session; a supervisor reuses it
    /// across restarts so the liveness view stays continuous.
    pub fn new(
        shard_id: u32,
        config: Arc<ClientConfig>,
        dispatcher: Arc<EventDispatcher>,
        factory: Arc<dyn TransportFactory>,
        status: Arc<ShardStatus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            shard_id,
            config,
            dispatcher,
            factory,
            status,
            shutdown,
            session_id: None,
            last_sequence: None,
        }
    }

    /// Shared read-only view of this session's state
    #[must_use]
    pub fn status(&self) -> Arc<ShardStatus> {
        self.status.clone()
    }

    /// Run the session until shutdown or an unrecoverable error
    ///
    /// Owns its connections: every exit path, error paths included,
    /// closes the active transport before returning.
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let mut backoff = ExponentialBackoff::new(self.config.reconnect.clone());

        loop {
            if *self.shutdown.borrow() {
                self.set_state(ShardState::Closed);
                return Ok(());
            }

            self.set_state(ShardState::Connecting);
            let mut transport = match self.factory.connect(&self.config.gateway_url).await {
                Ok(transport) => transport,
                Err(e) => {
                    let Some(delay) = backoff.next_delay() else {
                        self.set_state(ShardState::Closed);
                        return Err(GatewayError::ReconnectExhausted {
                            attempts: backoff.attempt(),
                        });
                    };
                    tracing::warn!(
                        shard_id = self.shard_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Connect failed, backing off"
                    );
                    if self.wait_or_shutdown(delay).await {
                        self.set_state(ShardState::Closed);
                        return Ok(());
                    }
                    continue;
                }
            };

            let outcome = self.drive_connection(transport.as_mut(), &mut backoff).await;
            transport.close().await;

            match outcome {
                Ok(ConnectionOutcome::Shutdown) => {
                    self.set_state(ShardState::Closed);
                    return Ok(());
                }
                Ok(ConnectionOutcome::Reconnect { resumable }) => {
                    if !resumable {
                        self.discard_session();
                    }
                    self.set_state(ShardState::Reconnecting);

                    let Some(delay) = backoff.next_delay() else {
                        self.set_state(ShardState::Closed);
                        return Err(GatewayError::ReconnectExhausted {
                            attempts: backoff.attempt(),
                        });
                    };
                    tracing::info!(
                        shard_id = self.shard_id,
                        resumable = resumable,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting"
                    );
                    if self.wait_or_shutdown(delay).await {
                        self.set_state(ShardState::Closed);
                        return Ok(());
                    }
                }
                Err(e) => {
                    tracing::error!(shard_id = self.shard_id, error = %e, "Shard session failed");
                    self.set_state(ShardState::Closed);
                    return Err(e);
                }
            }
        }
    }

    /// Drive one connection from handshake to its end
    async fn drive_connection(
        &mut self,
        transport: &mut dyn GatewayTransport,
        backoff: &mut ExponentialBackoff,
    ) -> Result<ConnectionOutcome, GatewayError> {
        let mut shutdown = self.shutdown.clone();
        self.set_state(ShardState::Handshaking);

        // The server speaks first; identify/resume wait for its Hello.
        let hello = tokio::select! {
            () = Self::shutdown_signal(&mut shutdown) => return Ok(ConnectionOutcome::Shutdown),
            () = tokio::time::sleep(self.config.hello_timeout) => {
                tracing::warn!(shard_id = self.shard_id, "Timed out waiting for Hello");
                return Ok(ConnectionOutcome::Reconnect { resumable: true });
            }
            event = transport.next_event() => match event {
                Ok(TransportEvent::Message(message)) => {
                    if message.op != OpCode::Hello {
                        tracing::warn!(
                            shard_id = self.shard_id,
                            op = %message.op,
                            "Expected Hello as the first frame"
                        );
                        return Ok(ConnectionOutcome::Reconnect { resumable: true });
                    }
                    let hello = match message.as_hello() {
                        Ok(hello) => hello,
                        Err(e) => {
                            tracing::warn!(shard_id = self.shard_id, error = %e, "Malformed Hello");
                            return Ok(ConnectionOutcome::Reconnect { resumable: true });
                        }
                    };
                    self.forward(&message);
                    hello
                }
                Ok(TransportEvent::Closed(code)) => return self.classify_close(code),
                Err(e) => {
                    tracing::warn!(shard_id = self.shard_id, error = %e, "Transport failed before Hello");
                    return Ok(ConnectionOutcome::Reconnect { resumable: true });
                }
            },
        };

        if let Err(e) = self.send_handshake(transport).await {
            tracing::warn!(shard_id = self.shard_id, error = %e, "Handshake send failed");
            return Ok(ConnectionOutcome::Reconnect { resumable: true });
        }

        let interval = Duration::from_millis(hello.heartbeat_interval.max(1));
        // First beat lands at a random point in the interval so a fleet of
        // shards does not beat in lockstep
        let first_beat = interval.mul_f64(rand::thread_rng().gen::<f64>());
        let mut heartbeat = tokio::time::interval_at(Instant::now() + first_beat, interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut ack_pending = false;

        loop {
            tokio::select! {
                () = Self::shutdown_signal(&mut shutdown) => return Ok(ConnectionOutcome::Shutdown),
                _ = heartbeat.tick() => {
                    if ack_pending {
                        tracing::warn!(
                            shard_id = self.shard_id,
                            "Heartbeat not acknowledged in time, assuming dead connection"
                        );
                        return Ok(ConnectionOutcome::Reconnect { resumable: true });
                    }
                    if let Err(e) = transport.send(GatewayMessage::heartbeat(self.last_sequence)).await {
                        tracing::warn!(shard_id = self.shard_id, error = %e, "Heartbeat send failed");
                        return Ok(ConnectionOutcome::Reconnect { resumable: true });
                    }
                    ack_pending = true;
                }
                event = transport.next_event() => match event {
                    Ok(TransportEvent::Message(message)) => {
                        if let Some(outcome) = self
                            .handle_message(&message, &mut ack_pending, transport, backoff)
                            .await
                        {
                            return Ok(outcome);
                        }
                    }
                    Ok(TransportEvent::Closed(code)) => return self.classify_close(code),
                    Err(e) => {
                        tracing::warn!(shard_id = self.shard_id, error = %e, "Transport read failed");
                        return Ok(ConnectionOutcome::Reconnect { resumable: true });
                    }
                },
            }
        }
    }

    /// React to one inbound frame
    ///
    /// Every frame, lifecycle-relevant or not, is also forwarded to the
    /// dispatcher; listeners may care about control frames too.
    async fn handle_message(
        &mut self,
        message: &GatewayMessage,
        ack_pending: &mut bool,
        transport: &mut dyn GatewayTransport,
        backoff: &mut ExponentialBackoff,
    ) -> Option<ConnectionOutcome> {
        if let Some(seq) = message.s {
            self.record_sequence(seq);
        }

        match message.op {
            OpCode::Dispatch => {
                if message.is_dispatch(EventType::Ready.as_str()) {
                    let decoded = serde_json::from_value::<ReadyPayload>(
                        message.d.clone().unwrap_or(serde_json::Value::Null),
                    );
                    match decoded {
                        Ok(ready) => {
                            tracing::info!(
                                shard_id = self.shard_id,
                                session_id = %ready.session_id,
                                "Shard ready"
                            );
                            self.session_id = Some(ready.session_id);
                            self.status.set_has_session(true);
                            self.set_state(ShardState::Ready);
                            backoff.reset();
                        }
                        Err(e) => {
                            tracing::error!(shard_id = self.shard_id, error = %e, "Malformed READY");
                            return Some(ConnectionOutcome::Reconnect { resumable: false });
                        }
                    }
                } else if message.is_dispatch(EventType::Resumed.as_str()) {
                    tracing::info!(shard_id = self.shard_id, "Session resumed");
                    self.set_state(ShardState::Ready);
                    backoff.reset();
                }
            }
            OpCode::Heartbeat => {
                // The server may demand an immediate beat
                if let Err(e) = transport.send(GatewayMessage::heartbeat(self.last_sequence)).await {
                    tracing::warn!(shard_id = self.shard_id, error = %e, "Heartbeat send failed");
                    return Some(ConnectionOutcome::Reconnect { resumable: true });
                }
            }
            OpCode::HeartbeatAck => {
                *ack_pending = false;
            }
            OpCode::Reconnect => {
                tracing::info!(shard_id = self.shard_id, "Server requested reconnect");
                self.forward(message);
                return Some(ConnectionOutcome::Reconnect { resumable: true });
            }
            OpCode::InvalidSession => {
                let resumable = message.invalid_session_resumable();
                tracing::warn!(shard_id = self.shard_id, resumable = resumable, "Session invalidated");
                self.forward(message);
                return Some(ConnectionOutcome::Reconnect { resumable });
            }
            OpCode::Hello => {
                tracing::debug!(shard_id = self.shard_id, "Unexpected mid-stream Hello, ignoring");
            }
            OpCode::Identify | OpCode::PresenceUpdate | OpCode::Resume => {
                tracing::debug!(shard_id = self.shard_id, op = %message.op, "Server sent a client-only op");
            }
        }

        self.forward(message);
        None
    }

    /// Send identify for a fresh session, or resume when one is held
    async fn send_handshake(&mut self, transport: &mut dyn GatewayTransport) -> Result<(), GatewayError> {
        match (self.session_id.clone(), self.last_sequence) {
            (Some(session_id), Some(seq)) => {
                self.set_state(ShardState::Resuming);
                tracing::info!(shard_id = self.shard_id, seq = seq, "Resuming session");
                transport
                    .send(GatewayMessage::resume(&ResumePayload {
                        token: self.config.token.expose().to_string(),
                        session_id,
                        seq,
                    }))
                    .await
            }
            _ => {
                tracing::info!(
                    shard_id = self.shard_id,
                    shard_count = self.config.shard_count,
                    "Identifying"
                );
                transport
                    .send(GatewayMessage::identify(&IdentifyPayload {
                        token: self.config.token.expose().to_string(),
                        shard: [self.shard_id, self.config.shard_count],
                        properties: Some(self.config.identify_properties.clone()),
                    }))
                    .await
            }
        }
    }

    /// Decide how to recover from a transport close
    fn classify_close(&mut self, code: Option<u16>) -> Result<ConnectionOutcome, GatewayError> {
        match code.and_then(CloseCode::from_u16) {
            Some(close) if close.is_fatal() => {
                tracing::error!(shard_id = self.shard_id, code = %close, "Fatal close");
                if close == CloseCode::AuthenticationFailed {
                    Err(GatewayError::Auth(close))
                } else {
                    Err(GatewayError::Fatal(close))
                }
            }
            Some(close) => {
                tracing::warn!(
                    shard_id = self.shard_id,
                    code = %close,
                    resumable = close.is_resumable(),
                    "Connection closed"
                );
                Ok(ConnectionOutcome::Reconnect {
                    resumable: close.is_resumable(),
                })
            }
            // No code or an unknown one reads as a network blip
            None => {
                tracing::warn!(shard_id = self.shard_id, raw_code = ?code, "Connection dropped");
                Ok(ConnectionOutcome::Reconnect { resumable: true })
            }
        }
    }

    /// Record a sequence number; the recorded value never decreases
    fn record_sequence(&mut self, seq: u64) {
        let next = self.last_sequence.map_or(seq, |prev| prev.max(seq));
        self.last_sequence = Some(next);
        self.status.set_sequence(next);
    }

    /// Drop session identity so the next handshake identifies afresh
    fn discard_session(&mut self) {
        self.session_id = None;
        self.last_sequence = None;
        self.status.clear_session();
    }

    fn set_state(&self, state: ShardState) {
        tracing::trace!(shard_id = self.shard_id, state = %state, "Shard state change");
        self.status.set_state(state);
    }

    /// Forward a frame to the dispatcher as a generic event
    ///
    /// Dispatch frames use their event name; control frames use the op
    /// name (e.g. `HeartbeatAck`).
    fn forward(&self, message: &GatewayMessage) {
        let name = message
            .t
            .clone()
            .unwrap_or_else(|| message.op.name().to_string());
        let event = DispatchEvent::new(
            name,
            message.d.clone().unwrap_or(serde_json::Value::Null),
            self.shard_id,
            message.s,
        );
        self.dispatcher.notify(&event);
    }

    /// Resolve once shutdown is requested (or the manager is gone)
    async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `delay`, returning true if shutdown arrived first
    async fn wait_or_shutdown(&mut self, delay: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            () = Self::shutdown_signal(&mut shutdown) => true,
            () = tokio::time::sleep(delay) => false,
        }
    }
}

impl std::fmt::Debug for ShardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSession")
            .field("shard_id", &self.shard_id)
            .field("state", &self.status.state())
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}
