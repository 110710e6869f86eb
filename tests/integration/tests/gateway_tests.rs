//! Gateway session integration tests
//!
//! Every test drives a real session against a scripted gateway; the
//! clock is paused so heartbeat intervals and reconnect backoffs advance
//! deterministically.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{fixtures::*, helpers::*};
use parking_lot::Mutex;
use pulse_core::{OpCode, ResumePayload, ANY_EVENT};
use pulse_gateway::{
    EventDispatcher, GatewayError, ShardManager, ShardSession, ShardState, ShardStatus,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

type SessionHandle = (
    Arc<ShardStatus>,
    watch::Sender<bool>,
    JoinHandle<Result<(), GatewayError>>,
);

fn spawn_session(factory: Arc<FakeGatewayFactory>, dispatcher: Arc<EventDispatcher>) -> SessionHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let status = ShardStatus::new(0);
    let session = ShardSession::new(
        0,
        Arc::new(test_config()),
        dispatcher,
        factory,
        status.clone(),
        shutdown_rx,
    );
    (status, shutdown_tx, tokio::spawn(session.run()))
}

#[tokio::test(start_paused = true)]
async fn test_recorded_sequence_is_the_maximum_seen() {
    let factory = FakeGatewayFactory::new(vec![ServerBehavior::new()
        .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(1), json!({}))))
        .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(5), json!({}))))
        .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(3), json!({}))))]);

    let (status, shutdown, task) = spawn_session(factory, EventDispatcher::new_shared());

    assert!(
        wait_until(|| status.last_sequence() == Some(5), Duration::from_secs(5)).await,
        "expected the recorded sequence to settle at the maximum"
    );

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(status.state(), ShardState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_missed_heartbeat_ack_reconnects_with_resume() {
    let factory = FakeGatewayFactory::new(vec![
        // First connection never acknowledges heartbeats
        ServerBehavior::new()
            .without_heartbeat_acks()
            .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(3), json!({})))),
        ServerBehavior::new(),
    ]);
    let log = factory.log();

    let (status, shutdown, task) = spawn_session(factory, EventDispatcher::new_shared());

    assert!(
        wait_until(
            || log.connection_count() == 2 && log.handshake_on(1).is_some(),
            Duration::from_secs(10),
        )
        .await,
        "expected a second connection after the missed ack"
    );

    let handshake = log.handshake_on(1).unwrap();
    assert_eq!(handshake.op, OpCode::Resume, "a resume, not a fresh identify");

    let payload: ResumePayload = serde_json::from_value(handshake.d.unwrap()).unwrap();
    assert_eq!(payload.session_id, "sess-1");
    assert_eq!(payload.seq, 3);

    assert!(wait_until(|| status.is_ready(), Duration::from_secs(5)).await);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_session_clears_identity_before_next_handshake() {
    let factory = FakeGatewayFactory::new(vec![
        ServerBehavior::new()
            .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(9), json!({}))))
            .after_identify(ScriptedFrame::Frame(invalid_session(false))),
        ServerBehavior::new(),
    ]);
    let log = factory.log();

    let (status, shutdown, task) = spawn_session(factory, EventDispatcher::new_shared());

    assert!(
        wait_until(
            || log.connection_count() == 2 && log.handshake_on(1).is_some(),
            Duration::from_secs(10),
        )
        .await
    );

    let handshake = log.handshake_on(1).unwrap();
    assert_eq!(
        handshake.op,
        OpCode::Identify,
        "a non-resumable invalidation must force a fresh identify"
    );

    assert!(wait_until(|| status.is_ready(), Duration::from_secs(5)).await);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_server_requested_reconnect_resumes() {
    let factory = FakeGatewayFactory::new(vec![
        ServerBehavior::new()
            .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(7), json!({}))))
            .after_identify(ScriptedFrame::Frame(reconnect())),
        ServerBehavior::new(),
    ]);
    let log = factory.log();

    let (_status, shutdown, task) = spawn_session(factory, EventDispatcher::new_shared());

    assert!(
        wait_until(
            || log.connection_count() == 2 && log.handshake_on(1).is_some(),
            Duration::from_secs(10),
        )
        .await
    );

    let handshake = log.handshake_on(1).unwrap();
    assert_eq!(handshake.op, OpCode::Resume);
    let payload: ResumePayload = serde_json::from_value(handshake.d.unwrap()).unwrap();
    assert_eq!(payload.seq, 7);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resumable_close_code_preserves_the_session() {
    let factory = FakeGatewayFactory::new(vec![
        ServerBehavior::new()
            .after_identify(ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(4), json!({}))))
            .after_identify(ScriptedFrame::Close(Some(4000))),
        ServerBehavior::new(),
    ]);
    let log = factory.log();

    let (_status, shutdown, task) = spawn_session(factory, EventDispatcher::new_shared());

    assert!(
        wait_until(
            || log.connection_count() == 2 && log.handshake_on(1).is_some(),
            Duration::from_secs(10),
        )
        .await
    );

    assert_eq!(log.handshake_on(1).unwrap().op, OpCode::Resume);

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_auth_rejection_is_fatal() {
    let factory = FakeGatewayFactory::new(vec![ServerBehavior::rejecting(4004)]);

    let (status, _shutdown, task) = spawn_session(factory, EventDispatcher::new_shared());

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, GatewayError::Auth(_)));
    assert_eq!(status.state(), ShardState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_every_frame_reaches_the_catch_all_listener() {
    let factory = FakeGatewayFactory::new(vec![ServerBehavior::new().after_identify(
        ScriptedFrame::Frame(dispatch("MESSAGE_CREATE", Some(1), json!({"content": "hi"}))),
    )]);

    let dispatcher = EventDispatcher::new_shared();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    dispatcher.register(ANY_EVENT, move |event| {
        sink.lock().push(event.name().to_string());
        Ok(())
    });

    let (_status, shutdown, task) = spawn_session(factory, dispatcher);

    assert!(
        wait_until(
            || seen.lock().iter().any(|n| n == "HeartbeatAck"),
            Duration::from_secs(5),
        )
        .await,
        "control frames must flow to the catch-all listener too"
    );

    let names = seen.lock().clone();
    assert!(names.contains(&"Hello".to_string()));
    assert!(names.contains(&"READY".to_string()));
    assert!(names.contains(&"MESSAGE_CREATE".to_string()));

    shutdown.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_manager_runs_a_staggered_fleet() {
    let factory = FakeGatewayFactory::new(vec![ServerBehavior::new(), ServerBehavior::new()]);

    let config = Arc::new({
        let mut config = test_config();
        config.shard_count = 2;
        config
    });
    let manager = ShardManager::with_factory(config, EventDispatcher::new_shared(), factory);
    manager.start().await;

    assert!(
        wait_until(|| manager.ready_count() == 2, Duration::from_secs(5)).await,
        "both shards should reach Ready"
    );

    let liveness = manager.liveness();
    assert_eq!(liveness.len(), 2);
    assert!(liveness.iter().all(|l| l.has_session));

    manager.shutdown().await;
    assert!(manager
        .liveness()
        .iter()
        .all(|l| l.state == ShardState::Closed));
}
