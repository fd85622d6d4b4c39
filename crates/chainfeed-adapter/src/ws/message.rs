/*
[INPUT]:  Raw WebSocket text frames exchanged with the option-chain hub
[OUTPUT]: Parsed ServerFrame values and serialized ClientFrame invocations
[POS]:    WebSocket layer - JSON envelope definitions
[UPDATE]: When adding new frame types or changing the envelope
*/

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{HubMethod, SubscriptionKey};
use crate::ws::transport::InboundMessage;

/// Frames sent to the hub
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Invocation {
        invocation_id: Uuid,
        target: HubMethod,
        arguments: Vec<serde_json::Value>,
    },
}

/// Frames received from the hub
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Result of a previously sent invocation
    Completion {
        invocation_id: Uuid,
        #[serde(default)]
        error: Option<String>,
    },
    /// Pushed payload for a key
    Update {
        instrument: String,
        expiry: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Application error reported for a key
    Error {
        instrument: String,
        expiry: String,
        message: String,
    },
    Ping,
    #[serde(other)]
    Other,
}

impl ServerFrame {
    /// Convert a push frame into an inbound message. Completions, pings and
    /// frames carrying an invalid key yield `None`.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        match self {
            ServerFrame::Update {
                instrument,
                expiry,
                payload,
            } => {
                let key = SubscriptionKey::new(instrument, expiry).ok()?;
                Some(InboundMessage::Update { key, payload })
            }
            ServerFrame::Error {
                instrument,
                expiry,
                message,
            } => {
                let key = SubscriptionKey::new(instrument, expiry).ok()?;
                Some(InboundMessage::Error { key, message })
            }
            ServerFrame::Completion { .. } | ServerFrame::Ping | ServerFrame::Other => None,
        }
    }
}
