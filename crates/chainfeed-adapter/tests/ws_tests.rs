/*
[INPUT]:  WebSocket test scenarios against an in-process hub
[OUTPUT]: Test results for the hub WebSocket transport
[POS]:    Integration tests - WebSocket
[UPDATE]: When WebSocket transport behaviour changes
*/

mod common;

use std::time::Duration;

use chainfeed_adapter::{
    BackoffSchedule, ChainFeedError, ChannelTransport, HubMethod, HubWebSocket, InboundMessage,
    TransportEvent,
};
use common::{REJECTED_EXPIRY, SILENT_EXPIRY, TestHub, next_event, nifty};
use tokio_test::{assert_err, assert_ok};

fn fast_backoff() -> BackoffSchedule {
    BackoffSchedule::from_millis(&[0, 50, 100]).expect("non-empty schedule")
}

#[test]
fn test_websocket_creation() {
    let mut ws = assert_ok!(HubWebSocket::new("wss://example.com/hubs/option-chain"));
    assert!(ws.take_events().is_some());
    assert!(!ws.is_connected());
}

#[test]
fn test_websocket_events_take_once() {
    let mut ws = assert_ok!(HubWebSocket::new("ws://127.0.0.1:1/hub"));
    assert!(ws.take_events().is_some());
    assert!(ws.take_events().is_none());
}

#[test]
fn test_websocket_rejects_http_url() {
    let err = assert_err!(HubWebSocket::new("http://example.com/hub"));
    assert!(matches!(err, ChainFeedError::Config(_)));
}

#[tokio::test]
async fn test_open_emits_opened_and_subscribe_completes() {
    let mut hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap().with_backoff(fast_backoff());
    let mut events = ws.take_events().unwrap();

    assert_ok!(ws.open().await);
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);
    assert!(ws.is_connected());

    let key = nifty("2025-01-30");
    assert_ok!(ws.send(HubMethod::Subscribe, key.to_args()).await);

    let frame = hub.next_frame().await;
    assert_eq!(frame["type"], "invocation");
    assert_eq!(frame["target"], "subscribe");
    assert_eq!(frame["arguments"], serde_json::json!(["NIFTY50", "2025-01-30"]));

    ws.close().await;
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap();

    assert_ok!(ws.open().await);
    let err = assert_err!(ws.open().await);
    assert!(matches!(err, ChainFeedError::AlreadyConnected));

    ws.close().await;
    ws.close().await;
}

#[tokio::test]
async fn test_calls_go_out_in_send_order() {
    let mut hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap();
    let mut events = ws.take_events().unwrap();
    ws.open().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    let old = nifty("2025-01-30");
    let new = nifty("2025-02-06");
    let unsubscribe = ws.send(HubMethod::Unsubscribe, old.to_args());
    let subscribe = ws.send(HubMethod::Subscribe, new.to_args());

    assert_eq!(hub.next_frame().await["target"], "unsubscribe");
    assert_eq!(hub.next_frame().await["target"], "subscribe");
    assert_ok!(subscribe.await);
    assert_ok!(unsubscribe.await);

    ws.close().await;
}

#[tokio::test]
async fn test_completion_error_is_rejection() {
    let mut hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap();
    let mut events = ws.take_events().unwrap();
    ws.open().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    let err = assert_err!(
        ws.send(HubMethod::Subscribe, nifty(REJECTED_EXPIRY).to_args())
            .await
    );
    assert_eq!(err.to_string(), "subscribe rejected by hub: unknown expiry");
    let _ = hub.next_frame().await;

    ws.close().await;
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url)
        .unwrap()
        .with_invocation_timeout(Duration::from_millis(200));
    let mut events = ws.take_events().unwrap();
    ws.open().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    let err = assert_err!(ws.send(HubMethod::Refresh, nifty(SILENT_EXPIRY).to_args()).await);
    assert!(matches!(err, ChainFeedError::Timeout { .. }));
    assert!(err.is_retryable());

    ws.close().await;
}

#[tokio::test]
async fn test_push_frames_become_messages() {
    let hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap();
    let mut events = ws.take_events().unwrap();
    ws.open().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    let key = nifty("2025-01-30");
    hub.push(serde_json::json!({"type": "ping"}));
    hub.push(serde_json::json!({"type": "something-new"}));
    hub.push_update(&key, serde_json::json!({"spot": 23500.5}));
    hub.push(serde_json::json!({
        "type": "error",
        "instrument": "NIFTY50",
        "expiry": "2025-01-30",
        "message": "chain unavailable",
    }));

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message(InboundMessage::Update {
            key: key.clone(),
            payload: serde_json::json!({"spot": 23500.5}),
        })
    );
    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message(InboundMessage::Error {
            key,
            message: "chain unavailable".to_string(),
        })
    );

    ws.close().await;
}

#[tokio::test]
async fn test_drop_emits_closed_then_reconnected() {
    let hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap().with_backoff(fast_backoff());
    let mut events = ws.take_events().unwrap();
    ws.open().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    hub.drop_connection();
    assert_eq!(next_event(&mut events).await, TransportEvent::Closed);
    assert_eq!(next_event(&mut events).await, TransportEvent::Reconnected);
    assert!(ws.is_connected());

    ws.close().await;
}

#[tokio::test]
async fn test_send_after_close_fails_immediately() {
    let hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap();
    let mut events = ws.take_events().unwrap();
    ws.open().await.unwrap();
    assert_eq!(next_event(&mut events).await, TransportEvent::Opened);

    ws.close().await;
    assert!(!ws.is_connected());
    let err = assert_err!(ws.send(HubMethod::Refresh, nifty("2025-01-30").to_args()).await);
    assert!(matches!(err, ChainFeedError::NotConnected));
    assert_eq!(err.to_string(), "not connected");
}

#[tokio::test]
async fn test_close_completes_with_unread_event_backlog() {
    let hub = TestHub::spawn().await;
    let mut ws = HubWebSocket::new(&hub.url).unwrap();
    let _events = ws.take_events().unwrap();
    ws.open().await.unwrap();

    // more pushes than the event queue holds, none of them read
    let key = nifty("2025-01-30");
    for tick in 0..150 {
        hub.push_update(&key, serde_json::json!({"tick": tick}));
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_ok!(tokio::time::timeout(Duration::from_secs(3), ws.close()).await);
    assert!(!ws.is_connected());
}
