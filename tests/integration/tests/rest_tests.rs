//! REST dispatcher integration tests
//!
//! Each test submits through a real `RestClient` backed by a scripted
//! HTTP transport, with the clock paused so quota waits are observable
//! and deterministic.
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use http::{Method, StatusCode};
use integration_tests::fixtures::*;
use pulse_common::RestConfig;
use pulse_rest::{RestClient, RestError, Route};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn client(transport: Arc<ScriptedHttp>, max_retries: u32) -> RestClient {
    let config = RestConfig {
        base_url: "https://api.test".to_string(),
        global_per_second: 100,
        max_retries,
        request_timeout: Duration::from_secs(5),
    };
    RestClient::with_transport(&config, transport)
}

fn post_message(channel_id: &str) -> Route {
    Route::new(Method::POST, "/channels/{channel_id}/messages").param("channel_id", channel_id)
}

#[tokio::test(start_paused = true)]
async fn test_second_request_waits_for_bucket_reset() {
    // Quota of one: the first call drains the bucket, the second must
    // hold until the advertised reset
    let transport = ScriptedHttp::new(vec![
        Ok(limited_response(StatusCode::OK, "b1", 0, 1, 2.0)),
        Ok(limited_response(StatusCode::OK, "b1", 0, 1, 2.0)),
    ]);
    let client = client(transport.clone(), 3);
    let route = post_message("123");

    client.submit(&route, Some(json!({"content": "one"}))).await.unwrap();
    client.submit(&route, Some(json!({"content": "two"}))).await.unwrap();

    let times = transport.call_times();
    assert_eq!(times.len(), 2);
    assert!(
        times[1] - times[0] >= Duration::from_secs(2),
        "second request must not issue before the bucket reset"
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submits_on_one_bucket_are_serialized() {
    let transport = ScriptedHttp::new(vec![
        Ok(limited_response(StatusCode::OK, "b1", 1, 2, 5.0)),
        Ok(limited_response(StatusCode::OK, "b1", 0, 2, 5.0)),
    ]);
    let client = client(transport.clone(), 3);

    let route_a = post_message("123");
    let route_b = post_message("123");
    let (a, b) = tokio::join!(
        client.submit(&route_a, Some(json!({"content": "a"}))),
        client.submit(&route_b, Some(json!({"content": "b"}))),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(
        transport.max_in_flight(),
        1,
        "requests sharing a bucket must never be in flight together"
    );
}

#[tokio::test(start_paused = true)]
async fn test_distinct_buckets_do_not_serialize() {
    let transport = ScriptedHttp::new(vec![Ok(ok_response()), Ok(ok_response())]);
    let client = client(transport.clone(), 3);

    let route_a = post_message("111");
    let route_b = post_message("222");
    let (a, b) = tokio::join!(
        client.submit(&route_a, Some(json!({"content": "a"}))),
        client.submit(&route_b, Some(json!({"content": "b"}))),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_retry_honors_the_server_delay() {
    let transport = ScriptedHttp::new(vec![
        Ok(throttle_response(1.5, false)),
        Ok(ok_response()),
    ]);
    let client = client(transport.clone(), 3);

    let response = client.submit(&post_message("123"), None).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let times = transport.call_times();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_secs_f64(1.5));
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhaustion_surfaces() {
    let transport = ScriptedHttp::new(vec![
        Ok(throttle_response(0.1, false)),
        Ok(throttle_response(0.1, false)),
        Ok(throttle_response(0.1, false)),
    ]);
    let client = client(transport.clone(), 2);

    let err = client.submit(&post_message("123"), None).await.unwrap_err();
    assert!(matches!(err, RestError::RateLimitExceeded { retries: 2, .. }));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_failures_are_never_replayed() {
    let transport = ScriptedHttp::new(vec![Err("timed out".to_string())]);
    let client = client(transport.clone(), 3);

    let err = client
        .submit(&post_message("123"), Some(json!({"content": "hi"})))
        .await
        .unwrap_err();

    assert!(matches!(err, RestError::AmbiguousOutcome { .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_throttle_failures_surface_with_status_and_body() {
    let mut response = ok_response();
    response.status = StatusCode::FORBIDDEN;
    response.body = "{\"message\": \"Missing access\"}".to_string();
    let transport = ScriptedHttp::new(vec![Ok(response)]);
    let client = client(transport.clone(), 3);

    let err = client.submit(&post_message("123"), None).await.unwrap_err();
    match err {
        RestError::RequestFailed { status, body } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(body.contains("Missing access"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_submit_json_decodes_the_body() {
    let mut response = ok_response();
    response.body = "{\"id\": \"42\", \"content\": \"hello\"}".to_string();
    let transport = ScriptedHttp::new(vec![Ok(response)]);
    let client = client(transport, 3);

    #[derive(serde::Deserialize)]
    struct Message {
        id: String,
        content: String,
    }

    let message: Message = client
        .submit_json(&Route::new(Method::GET, "/users/me"), None)
        .await
        .unwrap();
    assert_eq!(message.id, "42");
    assert_eq!(message.content, "hello");
}
