//! Room calls, the shared ledger and the display board through the HTTP API.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tokenline_server::api::WsMessage;
use tokio::sync::broadcast;

use common::{TestConfig, TestFixture};

async fn register(fixture: &TestFixture, names: &[&str]) {
    for name in names {
        let response = fixture
            .post("/api/v1/tickets", json!({ "name": name, "contact": "555-0100" }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }
}

/// Skip pushed events until one matches, or give up after a second.
async fn next_matching<F>(events: &mut broadcast::Receiver<WsMessage>, mut pred: F) -> WsMessage
where
    F: FnMut(&WsMessage) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        let msg = tokio::time::timeout_at(deadline, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcast closed");
        if pred(&msg) {
            return msg;
        }
    }
}

#[tokio::test]
async fn test_two_rooms_call_distinct_tokens_and_board_shows_both() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann", "Bob"]).await;
    let mut events = fixture.subscribe();

    let first = fixture.post_empty("/api/v1/stations/room-1/call").await;
    let second = fixture.post_empty("/api/v1/stations/room-2/call").await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["result"], "called");
    assert_eq!(first.body["record"]["token"], 1);
    assert_eq!(first.body["record"]["name"], "Ann");
    assert_eq!(second.body["record"]["token"], 2);
    assert_eq!(second.body["record"]["station_id"], "room-2");

    let report = fixture.poll_display();
    assert_eq!(report.board.entries.len(), 2);
    assert_eq!(report.notifications.len(), 2);
    assert!(report.board.anomalies.is_empty());

    let mut tokens: Vec<u32> = report.board.entries.iter().map(|e| e.token).collect();
    tokens.sort();
    assert_eq!(tokens, vec![1, 2]);

    match next_matching(&mut events, |m| {
        matches!(m, WsMessage::DisplayNotification(_))
    })
    .await
    {
        WsMessage::DisplayNotification(n) => assert!(n.token == 1 || n.token == 2),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_call_is_broadcast_to_consoles() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann"]).await;
    let mut events = fixture.subscribe();

    fixture.post_empty("/api/v1/stations/room-1/call").await;

    match next_matching(&mut events, |m| matches!(m, WsMessage::TokenCalled { .. })).await {
        WsMessage::TokenCalled {
            station_id,
            label,
            token,
            name,
            ..
        } => {
            assert_eq!(station_id, "room-1");
            assert_eq!(label, "room-1");
            assert_eq!(token, 1);
            assert_eq!(name, "Ann");
        }
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_queue_is_not_an_error() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/stations/room-1/call").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"], "queue_empty");

    let station = fixture.get("/api/v1/stations/room-1").await;
    assert!(station.body["current_token"].is_null());
}

#[tokio::test]
async fn test_queue_drains_then_reports_empty() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann"]).await;

    let first = fixture.post_empty("/api/v1/stations/room-1/call").await;
    let second = fixture.post_empty("/api/v1/stations/room-2/call").await;

    assert_eq!(first.body["record"]["token"], 1);
    assert_eq!(second.body["result"], "queue_empty");
}

#[tokio::test]
async fn test_closed_room_cannot_call() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann"]).await;
    let mut events = fixture.subscribe();

    let closed = fixture.post_empty("/api/v1/stations/room-1/close").await;
    assert_eq!(closed.status, StatusCode::OK);
    assert_eq!(closed.body["is_open"], false);
    assert!(matches!(
        events.recv().await.unwrap(),
        WsMessage::StationStatus { is_open: false, .. }
    ));

    let response = fixture.post_empty("/api/v1/stations/room-1/call").await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let reopened = fixture.post_empty("/api/v1/stations/room-1/open").await;
    assert_eq!(reopened.body["already_open"], false);
    assert_eq!(reopened.body["is_open"], true);

    let response = fixture.post_empty("/api/v1/stations/room-1/call").await;
    assert_eq!(response.body["record"]["token"], 1);
}

#[tokio::test]
async fn test_opening_an_open_room_is_idempotent() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/stations/room-2/open").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["already_open"], true);
}

#[tokio::test]
async fn test_unknown_room_is_404() {
    let fixture = TestFixture::new().await;

    assert_eq!(
        fixture.get("/api/v1/stations/room-9").await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        fixture.post_empty("/api/v1/stations/room-9/call").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_list_stations() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/stations").await;

    let stations = response.body["stations"].as_array().unwrap();
    assert_eq!(stations.len(), 2);
    assert_eq!(stations[0]["station_id"], "room-1");
    assert_eq!(stations[0]["is_open"], true);
}

#[tokio::test]
async fn test_recall_writes_nothing_to_the_ledger() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann"]).await;
    fixture.post_empty("/api/v1/stations/room-1/call").await;
    let mut events = fixture.subscribe();

    let response = fixture.post_empty("/api/v1/stations/room-1/recall").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["result"], "recalled");
    assert_eq!(response.body["token"]["token"], 1);
    assert!(matches!(
        events.recv().await.unwrap(),
        WsMessage::TokenRecalled { token: 1, .. }
    ));

    let ledger = fixture.get("/api/v1/ledger").await;
    assert_eq!(ledger.body["called_tokens"].as_array().unwrap().len(), 1);
    assert_eq!(ledger.body["date"], "2024-01-01");
}

#[tokio::test]
async fn test_recall_without_a_current_token() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/stations/room-1/recall").await;

    assert_eq!(response.body["result"], "nothing_to_recall");
}

#[tokio::test]
async fn test_waiting_clears_the_console_only() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann", "Bob"]).await;
    fixture.post_empty("/api/v1/stations/room-1/call").await;

    let response = fixture.post_empty("/api/v1/stations/room-1/wait").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["current_token"].is_null());

    // The claimed token stays claimed; the next call moves on.
    let next = fixture.post_empty("/api/v1/stations/room-1/call").await;
    assert_eq!(next.body["record"]["token"], 2);
}

#[tokio::test]
async fn test_json_ledger_backend() {
    let fixture = TestFixture::with_config(TestConfig::with_json_ledger()).await;
    register(&fixture, &["Ann", "Bob", "Cid"]).await;

    fixture.post_empty("/api/v1/stations/room-1/call").await;
    fixture.post_empty("/api/v1/stations/room-2/call").await;
    let third = fixture.post_empty("/api/v1/stations/room-1/call").await;
    assert_eq!(third.body["record"]["token"], 3);

    let ledger = fixture.get("/api/v1/ledger").await;
    assert_eq!(ledger.body["backend"], "json_file");
    assert_eq!(ledger.body["called_tokens"].as_array().unwrap().len(), 3);
    assert!(fixture.temp_dir.path().join("ledger.json").exists());

    let board = fixture.get("/api/v1/display/board").await;
    let entries = board.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let room_1 = entries
        .iter()
        .find(|e| e["station_id"] == "room-1")
        .unwrap();
    assert_eq!(room_1["token"], 3);
    assert_eq!(room_1["name"], "Cid");
}

#[tokio::test]
async fn test_board_updates_when_a_room_calls_again() {
    let fixture = TestFixture::new().await;
    register(&fixture, &["Ann", "Bob"]).await;

    fixture.post_empty("/api/v1/stations/room-1/call").await;
    let first = fixture.poll_display();
    assert_eq!(first.notifications.len(), 1);

    let unchanged = fixture.poll_display();
    assert!(unchanged.notifications.is_empty());

    fixture.clock.advance(chrono::Duration::seconds(30));
    fixture.post_empty("/api/v1/stations/room-1/call").await;
    let second = fixture.poll_display();

    assert_eq!(second.board.entries.len(), 1);
    assert_eq!(second.board.entries[0].token, 2);
    assert_eq!(second.notifications.len(), 1);
    assert_eq!(second.notifications[0].name, "Bob");
}

#[tokio::test]
async fn test_board_is_public_and_empty_before_any_call() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key("secret")).await;

    let board = fixture.get("/api/v1/display/board").await;

    assert_eq!(board.status, StatusCode::OK);
    assert_eq!(board.body["date"], "2024-01-01");
    assert!(board.body["entries"].as_array().unwrap().is_empty());
}
