//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use walletdash_dashboard::DashboardConfig;
use walletdash_sync::SyncConfig;

use crate::error::{AppError, AppResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "WALLETDASH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the dashboard aggregation backend.
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: DashboardConfig,
}

fn default_dashboard_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dashboard_url: default_dashboard_url(),
            wallet: WalletConfig::default(),
            sync: SyncConfig::default(),
            cache: CacheConfig::default(),
            server: DashboardConfig::default(),
        }
    }
}

/// Wallet provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// JSON-RPC endpoint of the wallet. Without one, connecting reports
    /// that no wallet is available.
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Interval for polling account and chain changes (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Silently restore a previously authorized account on start.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

fn default_poll_interval_ms() -> u64 {
    4_000
}

fn default_auto_reconnect() -> bool {
    true
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            auto_reconnect: default_auto_reconnect(),
        }
    }
}

impl WalletConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Durable cache location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

impl AppConfig {
    /// Resolve the config path (CLI arg > `WALLETDASH_CONFIG` > default) and
    /// load it. A missing file yields defaults.
    pub fn load(cli_path: Option<String>) -> AppResult<Self> {
        let explicit = cli_path.or_else(|| std::env::var(CONFIG_ENV).ok());
        match explicit {
            Some(path) => Self::from_file(&path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if !self.dashboard_url.starts_with("http://") && !self.dashboard_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "dashboard_url must be an http(s) URL, got {:?}",
                self.dashboard_url
            )));
        }
        if self.sync.cache_ttl_ms == 0 {
            return Err(AppError::Config("sync.cache_ttl_ms must be positive".to_string()));
        }
        if self.wallet.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "wallet.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
