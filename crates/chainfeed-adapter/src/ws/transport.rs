/*
[INPUT]:  Hub method calls from the subscription registry
[OUTPUT]: Ordered connectivity/push events and per-call outcomes
[POS]:    WebSocket layer - channel transport boundary
[UPDATE]: When the transport contract (events, send semantics) changes
*/

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{HubMethod, SubscriptionKey};

/// Outcome of a single `send`, resolved after the hub answers.
pub type SendFuture = BoxFuture<'static, Result<()>>;

/// Push message delivered by the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Update {
        key: SubscriptionKey,
        payload: serde_json::Value,
    },
    Error {
        key: SubscriptionKey,
        message: String,
    },
}

impl InboundMessage {
    pub fn key(&self) -> &SubscriptionKey {
        match self {
            InboundMessage::Update { key, .. } | InboundMessage::Error { key, .. } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::Update { .. } => "update",
            InboundMessage::Error { .. } => "error",
        }
    }
}

/// Events emitted by a transport, one at a time and in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// First connection after `open` is up.
    Opened,
    /// An established connection dropped; reconnection is in progress.
    Closed,
    /// A connection is up again after `Closed`.
    Reconnected,
    Message(InboundMessage),
}

/// Persistent bidirectional channel to the hub.
///
/// Implementations reconnect on their own after a drop; callers only react
/// to `Closed` and `Reconnected`.
#[async_trait]
pub trait ChannelTransport: Send + 'static {
    /// Start connecting. Returns once the connection attempt is scheduled.
    async fn open(&mut self) -> Result<()>;

    /// Stop the connection and any reconnection. Safe to call more than once.
    async fn close(&mut self);

    /// Issue a hub call. The frame is queued before this returns, so calls go
    /// out in the order `send` was invoked. Fails immediately with
    /// `NotConnected` while the link is down.
    fn send(&self, method: HubMethod, args: Vec<serde_json::Value>) -> SendFuture;

    /// Take the event receiver. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;
}
