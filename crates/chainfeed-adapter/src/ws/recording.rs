/*
[INPUT]:  Scripted connectivity events and per-method failures
[OUTPUT]: In-memory ChannelTransport that records every call
[POS]:    WebSocket layer - test double for registry and feed tests
[UPDATE]: When the ChannelTransport trait changes
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::future;
use tokio::sync::mpsc;

use crate::error::{ChainFeedError, Result};
use crate::types::{HubMethod, SubscriptionKey};
use crate::ws::transport::{ChannelTransport, InboundMessage, SendFuture, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// One call observed by a `RecordingTransport`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Open,
    Close,
    Send {
        method: HubMethod,
        args: Vec<serde_json::Value>,
    },
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<TransportCall>,
    failures: HashMap<HubMethod, String>,
    connected: bool,
}

/// In-memory transport. Connectivity follows the events injected through
/// its `RecordingHandle`: `Opened`/`Reconnected` bring the link up, `Closed`
/// and `close()` take it down.
#[derive(Debug)]
pub struct RecordingTransport {
    recorded: Arc<Mutex<Recorded>>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
}

/// Inspection and scripting side of a `RecordingTransport`.
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    recorded: Arc<Mutex<Recorded>>,
    event_tx: mpsc::Sender<TransportEvent>,
}

fn lock(recorded: &Mutex<Recorded>) -> MutexGuard<'_, Recorded> {
    recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingTransport {
    pub fn new() -> (Self, RecordingHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                recorded: recorded.clone(),
                event_rx: Some(event_rx),
            },
            RecordingHandle { recorded, event_tx },
        )
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    async fn open(&mut self) -> Result<()> {
        lock(&self.recorded).calls.push(TransportCall::Open);
        Ok(())
    }

    async fn close(&mut self) {
        let mut recorded = lock(&self.recorded);
        recorded.calls.push(TransportCall::Close);
        recorded.connected = false;
    }

    fn send(&self, method: HubMethod, args: Vec<serde_json::Value>) -> SendFuture {
        let mut recorded = lock(&self.recorded);
        recorded.calls.push(TransportCall::Send { method, args });

        let result = if !recorded.connected {
            Err(ChainFeedError::NotConnected)
        } else if let Some(reason) = recorded.failures.get(&method) {
            Err(ChainFeedError::rejected(method.as_str(), reason.clone()))
        } else {
            Ok(())
        };
        Box::pin(future::ready(result))
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_rx.take()
    }
}

impl RecordingHandle {
    /// Deliver an event to whoever holds the transport's event receiver.
    pub async fn emit(&self, event: TransportEvent) {
        {
            let mut recorded = lock(&self.recorded);
            match event {
                TransportEvent::Opened | TransportEvent::Reconnected => recorded.connected = true,
                TransportEvent::Closed => recorded.connected = false,
                TransportEvent::Message(_) => {}
            }
        }
        let _ = self.event_tx.send(event).await;
    }

    pub async fn push_update(&self, key: &SubscriptionKey, payload: serde_json::Value) {
        self.emit(TransportEvent::Message(InboundMessage::Update {
            key: key.clone(),
            payload,
        }))
        .await;
    }

    pub async fn push_error(&self, key: &SubscriptionKey, message: &str) {
        self.emit(TransportEvent::Message(InboundMessage::Error {
            key: key.clone(),
            message: message.to_string(),
        }))
        .await;
    }

    /// Make every later `send` of `method` fail with `reason`.
    pub fn fail_method(&self, method: HubMethod, reason: &str) {
        lock(&self.recorded)
            .failures
            .insert(method, reason.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.recorded).failures.clear();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.recorded).connected
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        lock(&self.recorded).calls.clone()
    }

    /// Sends only, as `(method, key)` pairs. Calls whose args are not a key are skipped.
    pub fn sent(&self) -> Vec<(HubMethod, SubscriptionKey)> {
        lock(&self.recorded)
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send { method, args } => {
                    let instrument = args.first()?.as_str()?;
                    let expiry = args.get(1)?.as_str()?;
                    let key = SubscriptionKey::new(instrument, expiry).ok()?;
                    Some((*method, key))
                }
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, method: HubMethod) -> usize {
        lock(&self.recorded)
            .calls
            .iter()
            .filter(|call| matches!(call, TransportCall::Send { method: m, .. } if *m == method))
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.count_call(&TransportCall::Open)
    }

    pub fn close_count(&self) -> usize {
        self.count_call(&TransportCall::Close)
    }

    fn count_call(&self, wanted: &TransportCall) -> usize {
        lock(&self.recorded)
            .calls
            .iter()
            .filter(|call| *call == wanted)
            .count()
    }
}
