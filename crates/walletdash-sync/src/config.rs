//! Synchronization timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the coordinator and connection manager.
///
/// Display windows of 0 disable auto-clearing; the message then stays until
/// cleared explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Cache entry time-to-live (ms). Default: 300,000 (5 minutes).
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Minimum interval between non-forced fetches for one address after a
    /// success (ms). Default: 60,000.
    #[serde(default = "default_min_refetch_interval_ms")]
    pub min_refetch_interval_ms: u64,
    /// Age after which a snapshot's own timestamp marks it stale (s). Default: 300.
    #[serde(default = "default_snapshot_max_age_secs")]
    pub snapshot_max_age_secs: u64,
    /// Upper bound on one dashboard fetch (ms). Default: 30,000.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// How long connection errors stay visible (ms). Default: 8,000.
    #[serde(default = "default_error_display_ms")]
    pub error_display_ms: u64,
    /// How long advisories stay visible (ms). Default: 6,000.
    #[serde(default = "default_advisory_display_ms")]
    pub advisory_display_ms: u64,
    /// How long fetch errors stay visible (ms). Default: 5,000.
    #[serde(default = "default_fetch_error_display_ms")]
    pub fetch_error_display_ms: u64,
    /// Upper bound on the wallet authorization flow (ms). Default: 120,000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

fn default_min_refetch_interval_ms() -> u64 {
    60_000
}

fn default_snapshot_max_age_secs() -> u64 {
    300
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_error_display_ms() -> u64 {
    8_000
}

fn default_advisory_display_ms() -> u64 {
    6_000
}

fn default_fetch_error_display_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    120_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_cache_ttl_ms(),
            min_refetch_interval_ms: default_min_refetch_interval_ms(),
            snapshot_max_age_secs: default_snapshot_max_age_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            error_display_ms: default_error_display_ms(),
            advisory_display_ms: default_advisory_display_ms(),
            fetch_error_display_ms: default_fetch_error_display_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }

    pub fn advisory_display(&self) -> Duration {
        Duration::from_millis(self.advisory_display_ms)
    }

    pub fn fetch_error_display(&self) -> Duration {
        Duration::from_millis(self.fetch_error_display_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.cache_ttl_ms, 300_000);
        assert_eq!(config.min_refetch_interval_ms, 60_000);
        assert_eq!(config.snapshot_max_age_secs, 300);
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"fetch_timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.fetch_timeout(), Duration::from_millis(1500));
        assert_eq!(config.min_refetch_interval_ms, 60_000);
    }
}
