//! Scripted endpoints for integration tests
//!
//! `FakeGatewayFactory` plays the server side of the gateway protocol
//! from per-connection scripts; `ScriptedHttp` answers REST requests from
//! a queue. Both record everything the client did for assertions.

use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_core::{EventType, GatewayMessage, OpCode};
use pulse_gateway::{GatewayError, GatewayTransport, TransportEvent, TransportFactory};
use pulse_rest::{HttpRequest, HttpResponse, HttpTransport};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

// ============================================================================
// Gateway-side frames (the fake server speaks these)
// ============================================================================

/// Build a Hello frame
pub fn hello(heartbeat_interval_ms: u64) -> GatewayMessage {
    GatewayMessage {
        op: OpCode::Hello,
        t: None,
        s: None,
        d: Some(json!({ "heartbeat_interval": heartbeat_interval_ms })),
    }
}

/// Build a sequenced dispatch frame
pub fn dispatch(name: &str, seq: Option<u64>, data: Value) -> GatewayMessage {
    GatewayMessage {
        op: OpCode::Dispatch,
        t: Some(name.to_string()),
        s: seq,
        d: Some(data),
    }
}

/// Build a READY dispatch for the given session id
pub fn ready(session_id: &str) -> GatewayMessage {
    dispatch(
        EventType::Ready.as_str(),
        None,
        json!({ "v": 1, "session_id": session_id }),
    )
}

/// Build a RESUMED dispatch
pub fn resumed() -> GatewayMessage {
    dispatch(EventType::Resumed.as_str(), None, json!({}))
}

/// Build a Heartbeat ACK frame
pub fn heartbeat_ack() -> GatewayMessage {
    GatewayMessage {
        op: OpCode::HeartbeatAck,
        t: None,
        s: None,
        d: None,
    }
}

/// Build a Reconnect request frame
pub fn reconnect() -> GatewayMessage {
    GatewayMessage {
        op: OpCode::Reconnect,
        t: None,
        s: None,
        d: None,
    }
}

/// Build an Invalid Session frame
pub fn invalid_session(resumable: bool) -> GatewayMessage {
    GatewayMessage {
        op: OpCode::InvalidSession,
        t: None,
        s: None,
        d: Some(Value::Bool(resumable)),
    }
}

// ============================================================================
// Scripted gateway
// ============================================================================

/// One frame in a connection script
#[derive(Debug, Clone)]
pub enum ScriptedFrame {
    /// Deliver a frame to the client
    Frame(GatewayMessage),
    /// Close the connection with the given close code
    Close(Option<u16>),
}

/// Server behavior for one accepted connection
#[derive(Debug, Clone)]
pub struct ServerBehavior {
    /// Heartbeat interval announced in Hello
    pub heartbeat_interval_ms: u64,
    /// Whether heartbeats are acknowledged
    pub ack_heartbeats: bool,
    /// Session id handed out on READY
    pub session_id: String,
    /// Frames delivered after the client identifies
    pub after_identify: Vec<ScriptedFrame>,
    /// Frames delivered after the client resumes
    pub after_resume: Vec<ScriptedFrame>,
    /// Close the connection instead of sending Hello
    pub reject_with: Option<u16>,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 50,
            ack_heartbeats: true,
            session_id: "sess-1".to_string(),
            after_identify: Vec::new(),
            after_resume: Vec::new(),
            reject_with: None,
        }
    }
}

impl ServerBehavior {
    /// A connection that identifies cleanly and then idles
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection closed with `code` before the handshake
    #[must_use]
    pub fn rejecting(code: u16) -> Self {
        Self {
            reject_with: Some(code),
            ..Self::default()
        }
    }

    /// Stop acknowledging heartbeats
    #[must_use]
    pub fn without_heartbeat_acks(mut self) -> Self {
        self.ack_heartbeats = false;
        self
    }

    /// Queue a frame for delivery after identify
    #[must_use]
    pub fn after_identify(mut self, frame: ScriptedFrame) -> Self {
        self.after_identify.push(frame);
        self
    }

    /// Queue a frame for delivery after resume
    #[must_use]
    pub fn after_resume(mut self, frame: ScriptedFrame) -> Self {
        self.after_resume.push(frame);
        self
    }
}

/// Record of everything clients sent, per connection
#[derive(Debug, Default)]
pub struct GatewayLog {
    connections: Mutex<Vec<Vec<GatewayMessage>>>,
}

impl GatewayLog {
    fn start_connection(&self) -> usize {
        let mut connections = self.connections.lock();
        connections.push(Vec::new());
        connections.len() - 1
    }

    fn record(&self, connection: usize, message: GatewayMessage) {
        self.connections.lock()[connection].push(message);
    }

    /// Number of connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Frames the client sent on connection `index`
    pub fn sent_on(&self, index: usize) -> Vec<GatewayMessage> {
        self.connections.lock().get(index).cloned().unwrap_or_default()
    }

    /// The identify or resume frame that opened connection `index`
    pub fn handshake_on(&self, index: usize) -> Option<GatewayMessage> {
        self.sent_on(index)
            .into_iter()
            .find(|m| matches!(m.op, OpCode::Identify | OpCode::Resume))
    }
}

struct FakeTransport {
    behavior: ServerBehavior,
    connection: usize,
    log: Arc<GatewayLog>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    inbound_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl FakeTransport {
    fn push(&self, frame: &ScriptedFrame) {
        let event = match frame {
            ScriptedFrame::Frame(message) => TransportEvent::Message(message.clone()),
            ScriptedFrame::Close(code) => TransportEvent::Closed(*code),
        };
        let _ = self.inbound_tx.send(event);
    }
}

#[async_trait]
impl GatewayTransport for FakeTransport {
    async fn send(&mut self, message: GatewayMessage) -> Result<(), GatewayError> {
        self.log.record(self.connection, message.clone());

        match message.op {
            OpCode::Identify => {
                self.push(&ScriptedFrame::Frame(ready(&self.behavior.session_id)));
                for frame in self.behavior.after_identify.clone() {
                    self.push(&frame);
                }
            }
            OpCode::Resume => {
                self.push(&ScriptedFrame::Frame(resumed()));
                for frame in self.behavior.after_resume.clone() {
                    self.push(&frame);
                }
            }
            OpCode::Heartbeat => {
                if self.behavior.ack_heartbeats {
                    self.push(&ScriptedFrame::Frame(heartbeat_ack()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent, GatewayError> {
        match self.inbound_rx.recv().await {
            Some(event) => Ok(event),
            // All senders live as long as the transport; recv never ends
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

/// Factory handing out one scripted connection per connect call
pub struct FakeGatewayFactory {
    scripts: Mutex<VecDeque<ServerBehavior>>,
    log: Arc<GatewayLog>,
}

impl FakeGatewayFactory {
    /// Create a factory from connection scripts, first connect first
    #[must_use]
    pub fn new(scripts: Vec<ServerBehavior>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            log: Arc::new(GatewayLog::default()),
        })
    }

    /// The shared record of client traffic
    #[must_use]
    pub fn log(&self) -> Arc<GatewayLog> {
        self.log.clone()
    }
}

#[async_trait]
impl TransportFactory for FakeGatewayFactory {
    async fn connect(&self, _url: &str) -> Result<Box<dyn GatewayTransport>, GatewayError> {
        let Some(behavior) = self.scripts.lock().pop_front() else {
            return Err(GatewayError::Transport(anyhow::anyhow!(
                "no scripted connections left"
            )));
        };

        let connection = self.log.start_connection();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        if let Some(code) = behavior.reject_with {
            let _ = inbound_tx.send(TransportEvent::Closed(Some(code)));
        } else {
            let _ = inbound_tx.send(TransportEvent::Message(hello(behavior.heartbeat_interval_ms)));
        }

        Ok(Box::new(FakeTransport {
            behavior,
            connection,
            log: self.log.clone(),
            inbound_tx,
            inbound_rx,
        }))
    }
}

// ============================================================================
// Scripted HTTP endpoint
// ============================================================================

/// HTTP transport answering from a response queue
pub struct ScriptedHttp {
    script: Mutex<VecDeque<Result<HttpResponse, String>>>,
    call_times: Mutex<Vec<tokio::time::Instant>>,
    in_flight: AtomicI32,
    max_in_flight: AtomicI32,
}

impl ScriptedHttp {
    /// Create a transport from queued responses, first request first
    #[must_use]
    pub fn new(script: Vec<Result<HttpResponse, String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            call_times: Mutex::new(Vec::new()),
            in_flight: AtomicI32::new(0),
            max_in_flight: AtomicI32::new(0),
        })
    }

    /// Number of requests served
    pub fn calls(&self) -> usize {
        self.call_times.lock().len()
    }

    /// When each request arrived
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().clone()
    }

    /// Highest number of simultaneously in-flight requests observed
    pub fn max_in_flight(&self) -> i32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn perform(&self, _request: &HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.call_times.lock().push(tokio::time::Instant::now());
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        // Widen the race window so overlapping requests would be caught
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;

        let result = self.script.lock().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => panic!("HTTP script exhausted"),
        }
    }
}

/// Build a response with rate-limit headers
#[must_use]
pub fn limited_response(
    status: http::StatusCode,
    bucket: &str,
    remaining: u32,
    limit: u32,
    reset_after: f64,
) -> HttpResponse {
    let mut headers = http::HeaderMap::new();
    headers.insert("x-ratelimit-bucket", bucket.parse().unwrap());
    headers.insert("x-ratelimit-remaining", remaining.to_string().parse().unwrap());
    headers.insert("x-ratelimit-limit", limit.to_string().parse().unwrap());
    headers.insert("x-ratelimit-reset-after", reset_after.to_string().parse().unwrap());
    HttpResponse {
        status,
        headers,
        body: "{}".to_string(),
    }
}

/// Build a throttle response carrying a retry delay
#[must_use]
pub fn throttle_response(retry_after: f64, global: bool) -> HttpResponse {
    let mut headers = http::HeaderMap::new();
    headers.insert("retry-after", retry_after.to_string().parse().unwrap());
    if global {
        headers.insert("x-ratelimit-global", "true".parse().unwrap());
    }
    HttpResponse {
        status: http::StatusCode::TOO_MANY_REQUESTS,
        headers,
        body: "{\"message\": \"You are being rate limited.\"}".to_string(),
    }
}

/// Build a plain success response
#[must_use]
pub fn ok_response() -> HttpResponse {
    HttpResponse {
        status: http::StatusCode::OK,
        headers: http::HeaderMap::new(),
        body: "{}".to_string(),
    }
}
