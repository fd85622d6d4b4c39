/*
[INPUT]:  Hub method names used on the channel
[OUTPUT]: Typed method identifiers with serialization support
[POS]:    Data layer - outbound method names
[UPDATE]: When the hub exposes new methods
*/

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HubMethod {
    Subscribe,
    Unsubscribe,
    Refresh,
}

impl HubMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubMethod::Subscribe => "subscribe",
            HubMethod::Unsubscribe => "unsubscribe",
            HubMethod::Refresh => "refresh",
        }
    }
}

impl fmt::Display for HubMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
