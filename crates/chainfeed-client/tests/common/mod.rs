/*
[INPUT]:  Feed scenarios driven through a recording transport or a local hub
[OUTPUT]: Shared fixtures, wait helpers and a minimal in-process hub
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for chainfeed-client tests

#![allow(dead_code)]

use std::time::Duration;

use chainfeed_adapter::SubscriptionKey;
use chainfeed_client::{ConnectionState, FeedView};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(5);
pub const REFRESH: Duration = Duration::from_secs(30);

pub fn nifty(expiry: &str) -> SubscriptionKey {
    SubscriptionKey::new("NIFTY50", expiry).expect("valid test key")
}

pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    wanted: ConnectionState,
) {
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == wanted))
        .await
        .unwrap_or_else(|_| panic!("state {wanted:?} not reached"))
        .expect("feed worker alive");
}

pub async fn wait_for_view(
    rx: &mut watch::Receiver<FeedView>,
    predicate: impl FnMut(&FeedView) -> bool,
) -> FeedView {
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("view change within timeout")
        .expect("feed worker alive")
        .clone()
}

/// Let spawned tasks and the feed worker drain their queues.
pub async fn settle() {
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[derive(Debug)]
enum HubControl {
    Push(Value),
    DropConnection,
}

/// In-process option-chain hub that acknowledges every invocation.
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
                                    let reply = json!({
                                        "type": "completion",
                                        "invocation_id": frame["invocation_id"],
                                        "error": null,
                                    });
                                    let _ = frames_tx.send(frame);
                                    if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
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

    /// Next frame the client sent, as `(target, key)`.
    pub async fn next_call(&mut self) -> (String, SubscriptionKey) {
        let frame = tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("hub frame within timeout")
            .expect("hub still running");
        let target = frame["target"].as_str().unwrap_or_default().to_string();
        let key = SubscriptionKey::new(
            frame["arguments"][0].as_str().unwrap_or_default(),
            frame["arguments"][1].as_str().unwrap_or_default(),
        )
        .expect("frame carries a key");
        (target, key)
    }

    pub fn push_update(&self, key: &SubscriptionKey, payload: Value) {
        let _ = self.control.send(HubControl::Push(json!({
            "type": "update",
            "instrument": key.instrument(),
            "expiry": key.expiry(),
            "payload": payload,
        })));
    }

    pub fn drop_connection(&self) {
        let _ = self.control.send(HubControl::DropConnection);
    }
}
