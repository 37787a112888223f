//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of a [`Spectoda`](crate::Spectoda) client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connector kind assigned at build time
    pub connector: String,
    /// Transport timeout for executes, requests and clock operations
    pub default_timeout_ms: u64,
    /// Added to an operation's own timeout before the caller gives up
    pub timeout_margin_ms: u64,
    /// Largest combined payload of one execute delivery
    pub chunk_size: usize,
    /// Pause before draining so a burst of commands can coalesce
    pub drain_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub scan_duration_ms: u64,
    pub firmware_update_timeout_ms: u64,
    /// 32 hex characters identifying the network owner
    pub owner_signature: Option<String>,
    /// 32 hex characters authorizing the owner
    pub owner_key: Option<String>,
    /// Buffered application events per subscriber
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connector: "dummy".to_string(),
            default_timeout_ms: 5_000,
            timeout_margin_ms: 5_000,
            chunk_size: spectoda_core::MAX_CHUNK_SIZE,
            drain_delay_ms: 1,
            connect_timeout_ms: 10_000,
            scan_duration_ms: 3_000,
            firmware_update_timeout_ms: 600_000,
            owner_signature: None,
            owner_key: None,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn timeout_margin(&self) -> Duration {
        Duration::from_millis(self.timeout_margin_ms)
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    pub fn firmware_update_timeout(&self) -> Duration {
        Duration::from_millis(self.firmware_update_timeout_ms)
    }

    /// Caller-side guard for an operation that itself waits `timeout`
    pub fn guard(&self, timeout: Duration) -> Duration {
        timeout + self.timeout_margin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"connector":"edummy","chunk_size":64}"#).unwrap();
        assert_eq!(config.connector, "edummy");
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.guard(Duration::from_secs(1)), Duration::from_secs(6));
    }
}
