/*
[INPUT]:  Instrument/expiry selections and hub push payloads
[OUTPUT]: Typed subscription keys, snapshots and error events
[POS]:    Data layer - types shared by the transport and the registry
[UPDATE]: When the key shape or snapshot metadata changes
*/

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChainFeedError, Result};

/// The (instrument, expiry) pair a consumer wants live data for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSubscriptionKey")]
pub struct SubscriptionKey {
    instrument: String,
    expiry: String,
}

#[derive(Deserialize)]
struct RawSubscriptionKey {
    instrument: String,
    expiry: String,
}

impl TryFrom<RawSubscriptionKey> for SubscriptionKey {
    type Error = ChainFeedError;

    fn try_from(raw: RawSubscriptionKey) -> Result<Self> {
        Self::new(raw.instrument, raw.expiry)
    }
}

impl SubscriptionKey {
    /// Create a key; both parts must be non-blank.
    pub fn new(instrument: impl Into<String>, expiry: impl Into<String>) -> Result<Self> {
        let instrument = instrument.into();
        let expiry = expiry.into();
        if instrument.trim().is_empty() {
            return Err(ChainFeedError::InvalidKey(
                "instrument must not be empty".to_string(),
            ));
        }
        if expiry.trim().is_empty() {
            return Err(ChainFeedError::InvalidKey(
                "expiry must not be empty".to_string(),
            ));
        }
        Ok(Self { instrument, expiry })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn expiry(&self) -> &str {
        &self.expiry
    }

    /// Positional hub arguments: `[instrument, expiry]`.
    pub fn to_args(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::String(self.instrument.clone()),
            serde_json::Value::String(self.expiry.clone()),
        ]
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.instrument, self.expiry)
    }
}

/// Latest accepted payload, tagged with the key it arrived under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: SubscriptionKey,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(key: SubscriptionKey, payload: serde_json::Value) -> Self {
        Self {
            key,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Error reported against a key, either by the hub or by a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub key: SubscriptionKey,
    pub message: String,
}
