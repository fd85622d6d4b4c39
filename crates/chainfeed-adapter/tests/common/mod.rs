/*
[INPUT]:  Test scenarios needing a live hub endpoint
[OUTPUT]: In-process WebSocket hub, fixtures and wait helpers
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When the hub envelope or test patterns change
*/

//! Common test utilities for chainfeed-adapter tests

use std::time::Duration;

use chainfeed_adapter::{SubscriptionKey, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);

/// Expiry the test hub rejects on subscribe
pub const REJECTED_EXPIRY: &str = "1999-01-01";

/// Expiry the test hub never answers
pub const SILENT_EXPIRY: &str = "2099-12-31";

#[derive(Debug)]
enum HubControl {
    Push(Value),
    DropConnection,
}

/// Minimal option-chain hub: answers every invocation with a completion,
/// records received frames, and can push frames or drop the connection.
pub struct TestHub {
    pub url: String,
    frames: mpsc::UnboundedReceiver<Value>,
    control: mpsc::UnboundedSender<HubControl>,
}

impl TestHub {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test hub");
        let addr = listener.local_addr().expect("test hub address");
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (control, mut control_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                loop {
                    tokio::select! {
                        incoming = ws.next() => {
                            match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                                        continue;
                                    };
                                    let reply = completion_for(&frame);
                                    let _ = frames_tx.send(frame);
                                    if let Some(reply) = reply
                                        && ws.send(Message::Text(reply.to_string().into())).await.is_err()
                                    {
                                        break;
                                    }
                                }
                                Some(Ok(_)) => {}
                                Some(Err(_)) | None => break,
                            }
                        }
                        control = control_rx.recv() => {
                            match control {
                                Some(HubControl::Push(frame)) => {
                                    let _ = ws.send(Message::Text(frame.to_string().into())).await;
                                }
                                Some(HubControl::DropConnection) | None => break,
                            }
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/hubs/option-chain"),
            frames,
            control,
        }
    }

    /// Next frame the client sent.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("hub frame within timeout")
            .expect("hub still running")
    }

    pub fn push(&self, frame: Value) {
        let _ = self.control.send(HubControl::Push(frame));
    }

    pub fn push_update(&self, key: &SubscriptionKey, payload: Value) {
        self.push(json!({
            "type": "update",
            "instrument": key.instrument(),
            "expiry": key.expiry(),
            "payload": payload,
        }));
    }

    /// Close the current connection without a close handshake.
    pub fn drop_connection(&self) {
        let _ = self.control.send(HubControl::DropConnection);
    }
}

fn completion_for(frame: &Value) -> Option<Value> {
    let expiry = frame["arguments"][1].as_str().unwrap_or_default();
    if expiry == SILENT_EXPIRY {
        return None;
    }
    let error = if frame["target"] == "subscribe" && expiry == REJECTED_EXPIRY {
        Value::String("unknown expiry".to_string())
    } else {
        Value::Null
    };
    Some(json!({
        "type": "completion",
        "invocation_id": frame["invocation_id"],
        "error": error,
    }))
}

pub fn nifty(expiry: &str) -> SubscriptionKey {
    SubscriptionKey::new("NIFTY50", expiry).expect("valid test key")
}

pub async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("transport event within timeout")
        .expect("event stream open")
}
