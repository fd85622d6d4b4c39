/*
[INPUT]:  Reconnection attempt count
[OUTPUT]: Delay before the next connection attempt
[POS]:    Transport layer - reconnection pacing (pure, no I/O)
[UPDATE]: When changing the default reconnect schedule
*/

use std::time::Duration;

use crate::error::{ChainFeedError, Result};

/// Default reconnect delays in milliseconds.
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 5] = [0, 2_000, 5_000, 10_000, 30_000];

/// Fixed reconnect schedule. Attempts past the end hold at the last delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    /// Build a schedule from millisecond delays. The list must not be empty.
    pub fn from_millis(delays_ms: &[u64]) -> Result<Self> {
        if delays_ms.is_empty() {
            return Err(ChainFeedError::Config(
                "reconnect schedule must contain at least one delay".to_string(),
            ));
        }
        Ok(Self {
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
        })
    }

    /// Delay before connection attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let last = self.delays.len() - 1;
        let index = (attempt as usize).min(last);
        self.delays[index]
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: DEFAULT_RECONNECT_DELAYS_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}
