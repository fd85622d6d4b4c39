/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed and validated feed configuration
[POS]:    Configuration layer - hub endpoint, timings and initial selection
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use chainfeed_adapter::{
    BackoffSchedule, DEFAULT_RECONNECT_DELAYS_MS, HubWebSocket, SubscriptionKey,
};

use crate::refresh::DEFAULT_REFRESH_INTERVAL;

/// Top-level configuration for the live chain feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Hub WebSocket endpoint (ws:// or wss://)
    pub hub_url: String,
    /// Seconds between recurring refresh calls
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Seconds to wait for a hub completion before a call fails
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,
    /// Reconnect delays in milliseconds; the last entry repeats
    #[serde(default = "default_reconnect_delays_ms")]
    pub reconnect_delays_ms: Vec<u64>,
    /// Key to subscribe to at startup
    #[serde(default)]
    pub subscription: Option<SubscriptionConfig>,
}

/// Instrument/expiry selection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    /// Underlying instrument (e.g., "NIFTY50")
    pub instrument: String,
    /// Expiry date as the hub spells it (e.g., "2025-01-30")
    pub expiry: String,
}

impl SubscriptionConfig {
    pub fn to_key(&self) -> anyhow::Result<SubscriptionKey> {
        SubscriptionKey::new(self.instrument.clone(), self.expiry.clone())
            .context("invalid subscription in config")
    }
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

fn default_invocation_timeout_secs() -> u64 {
    10
}

fn default_reconnect_delays_ms() -> Vec<u64> {
    DEFAULT_RECONNECT_DELAYS_MS.to_vec()
}

impl FeedConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval_secs == 0 {
            bail!("refresh_interval_secs must be greater than zero");
        }
        if self.invocation_timeout_secs == 0 {
            bail!("invocation_timeout_secs must be greater than zero");
        }
        self.backoff()?;
        if let Some(subscription) = &self.subscription {
            subscription.to_key()?;
        }
        HubWebSocket::new(&self.hub_url).context("invalid hub_url")?;
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn backoff(&self) -> anyhow::Result<BackoffSchedule> {
        BackoffSchedule::from_millis(&self.reconnect_delays_ms).context("invalid reconnect_delays_ms")
    }

    /// Build the hub transport described by this configuration.
    pub fn build_transport(&self) -> anyhow::Result<HubWebSocket> {
        let transport = HubWebSocket::new(&self.hub_url)
            .context("invalid hub_url")?
            .with_backoff(self.backoff()?)
            .with_invocation_timeout(self.invocation_timeout());
        Ok(transport)
    }
}
