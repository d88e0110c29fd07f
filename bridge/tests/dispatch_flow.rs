mod common;

use common::*;
use httpmock::prelude::*;
use line_photos_bridge::error::BridgeError;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(30)
}

async fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock_async(|when, then| {
        when.method(POST).path("/token");
        then.status(200).json_body(json!({ "access_token": "at-1", "expires_in": 3600, "scope": "photos" }));
    }).await
}

#[tokio::test]
async fn mixed_batch_uploads_each_image_and_continues_past_failures() {
    let server = MockServer::start_async().await;
    let token = mock_token(&server).await;
    let upload = server.mock_async(|when, then| {
        when.method(POST).path("/v1/uploads").header("authorization", "Bearer at-1");
        then.status(200).body("u1");
    }).await;
    let alice = server.mock_async(|when, then| {
        when.method(POST).path("/v1/mediaItems:batchCreate").body_contains("Alice uploaded");
        then.status(500).body("backend error");
    }).await;
    let bob = server.mock_async(|when, then| {
        when.method(POST).path("/v1/mediaItems:batchCreate").body_contains("Bob uploaded");
        then.status(200).json_body(json!({ "newMediaItemResults": [] }));
    }).await;

    let platform = Arc::new(
        FakePlatform::default()
            .with_image("A")
            .with_image("B")
            .with_name("Ualice", "Alice")
            .with_name("Ubob", "Bob"),
    );
    let dispatcher = dispatcher(&server, Arc::clone(&platform));
    let batch = events(vec![
        text_event("T", "Ualice"),
        image_event("A", "Ualice"),
        image_event("B", "Ubob"),
    ]);

    let report = dispatcher.dispatch(&batch, far_deadline()).await;

    assert_eq!(platform.fetched(), vec!["A".to_string(), "B".to_string()]);
    upload.assert_hits_async(2).await;
    alice.assert_hits_async(1).await;
    bob.assert_hits_async(1).await;
    token.assert_hits_async(1).await;

    assert_eq!(report.received, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.uploaded, vec!["B".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].message_id, "A");
    assert_eq!(report.failures[0].index, 1);
    assert!(matches!(report.failures[0].error, BridgeError::MediaItem { .. }));
    assert!(!report.aborted);
    assert_eq!(platform.open_streams(), 0);
}

#[tokio::test]
async fn failed_media_item_after_raw_upload_still_closes_stream() {
    let server = MockServer::start_async().await;
    mock_token(&server).await;
    let upload = server.mock_async(|when, then| {
        when.method(POST)
            .path("/v1/uploads")
            .header("x-goog-upload-content-type", "image/jpeg")
            .header("x-goog-upload-protocol", "raw");
        then.status(200).body("u1");
    }).await;
    let create = server.mock_async(|when, then| {
        when.method(POST)
            .path("/v1/mediaItems:batchCreate")
            .json_body(json!({
                "albumId": "album-1",
                "newMediaItems": [{
                    "description": "Alice uploaded",
                    "simpleMediaItem": { "uploadToken": "u1" }
                }]
            }));
        then.status(500).body("internal");
    }).await;

    let platform = Arc::new(FakePlatform::default().with_image("A").with_name("Ualice", "Alice"));
    let report = dispatcher(&server, Arc::clone(&platform))
        .dispatch(&events(vec![image_event("A", "Ualice")]), far_deadline())
        .await;

    upload.assert_hits_async(1).await;
    create.assert_hits_async(1).await;
    assert!(report.uploaded.is_empty());
    match &report.failures[0].error {
        BridgeError::MediaItem { detail } => assert!(detail.contains("internal")),
        other => panic!("expected media item error, got {other}"),
    }
    assert_eq!(platform.closed.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(platform.open_streams(), 0);
}

#[tokio::test]
async fn profile_lookup_failure_uses_fallback_name() {
    let server = MockServer::start_async().await;
    mock_token(&server).await;
    server.mock_async(|when, then| {
        when.method(POST).path("/v1/uploads");
        then.status(200).body("u1");
    }).await;
    let create = server.mock_async(|when, then| {
        when.method(POST).path("/v1/mediaItems:batchCreate").body_contains("someone uploaded");
        then.status(200);
    }).await;

    let platform = Arc::new(FakePlatform::default().with_image("A"));
    let report = dispatcher(&server, Arc::clone(&platform))
        .dispatch(&events(vec![image_event("A", "Unknown")]), far_deadline())
        .await;

    assert!(report.is_success(), "{}", report.summary());
    create.assert_hits_async(1).await;
}

#[tokio::test]
async fn content_fetch_failure_fails_only_that_event() {
    let server = MockServer::start_async().await;
    mock_token(&server).await;
    let upload = server.mock_async(|when, then| {
        when.method(POST).path("/v1/uploads");
        then.status(200).body("u2");
    }).await;
    server.mock_async(|when, then| {
        when.method(POST).path("/v1/mediaItems:batchCreate");
        then.status(200);
    }).await;

    // "gone" has no content registered.
    let platform = Arc::new(FakePlatform::default().with_image("B").with_name("Ubob", "Bob"));
    let report = dispatcher(&server, Arc::clone(&platform))
        .dispatch(&events(vec![image_event("gone", "Ubob"), image_event("B", "Ubob")]), far_deadline())
        .await;

    upload.assert_hits_async(1).await;
    assert_eq!(report.uploaded, vec!["B".to_string()]);
    assert!(matches!(report.failures[0].error, BridgeError::ContentFetch(_)));
    assert_eq!(report.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn credential_refresh_failure_aborts_the_batch() {
    let server = MockServer::start_async().await;
    let token = server.mock_async(|when, then| {
        when.method(POST).path("/token");
        then.status(401).body("unauthorized_client");
    }).await;
    let upload = server.mock_async(|when, then| {
        when.method(POST).path("/v1/uploads");
        then.status(200).body("u1");
    }).await;

    let platform = Arc::new(FakePlatform::default().with_image("A").with_image("B"));
    let report = dispatcher(&server, Arc::clone(&platform))
        .dispatch(&events(vec![image_event("A", "Ua"), image_event("B", "Ub")]), far_deadline())
        .await;

    token.assert_hits_async(1).await;
    upload.assert_hits_async(0).await;
    assert_eq!(platform.fetched(), vec!["A".to_string()]);
    assert!(report.aborted);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].error {
        BridgeError::Auth { status, body } => {
            assert_eq!(*status, 401);
            assert!(body.contains("unauthorized_client"));
        }
        other => panic!("expected auth error, got {other}"),
    }
    assert_eq!(platform.open_streams(), 0);
}

#[tokio::test]
async fn deadline_cancels_in_flight_upload() {
    let server = MockServer::start_async().await;
    mock_token(&server).await;
    server.mock_async(|when, then| {
        when.method(POST).path("/v1/uploads");
        then.status(200).delay(Duration::from_secs(5)).body("late");
    }).await;
    let create = server.mock_async(|when, then| {
        when.method(POST).path("/v1/mediaItems:batchCreate");
        then.status(200);
    }).await;

    let platform = Arc::new(FakePlatform::default().with_image("A"));
    let started = Instant::now();
    let report = dispatcher(&server, Arc::clone(&platform))
        .dispatch(&events(vec![image_event("A", "Ua")]), Instant::now() + Duration::from_millis(300))
        .await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(report.failures[0].error, BridgeError::DeadlineExceeded { .. }));
    create.assert_hits_async(0).await;
}

#[tokio::test]
async fn events_after_the_deadline_are_failed_without_fetching() {
    let server = MockServer::start_async().await;
    mock_token(&server).await;
    server.mock_async(|when, then| {
        when.method(POST).path("/v1/uploads");
        then.status(200).delay(Duration::from_secs(5)).body("late");
    }).await;

    let platform = Arc::new(FakePlatform::default().with_image("A").with_image("B"));
    let report = dispatcher(&server, Arc::clone(&platform))
        .dispatch(
            &events(vec![image_event("A", "Ua"), image_event("B", "Ub")]),
            Instant::now() + Duration::from_millis(300),
        )
        .await;

    assert_eq!(platform.fetched(), vec!["A".to_string()]);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[1].message_id, "B");
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, BridgeError::DeadlineExceeded { .. })));
    assert!(report.uploaded.is_empty());
    assert_eq!(platform.open_streams(), 0);
}

#[tokio::test]
async fn non_image_events_make_no_calls() {
    let server = MockServer::start_async().await;
    let token = mock_token(&server).await;

    let platform = Arc::new(FakePlatform::default());
    let batch = events(vec![
        text_event("T1", "Ua"),
        json!({"type": "follow", "source": {"type": "user", "userId": "Ua"}}),
        json!({"type": "message", "message": {"id": "S", "type": "sticker"}}),
    ]);
    let report = dispatcher(&server, Arc::clone(&platform)).dispatch(&batch, far_deadline()).await;

    assert!(report.is_success());
    assert_eq!(report.skipped, 3);
    assert!(platform.fetched().is_empty());
    token.assert_hits_async(0).await;
}
