//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(#[from] walletdash_cache::CacheError),

    #[error("Dashboard client error: {0}")]
    Client(#[from] walletdash_client::FetchError),

    #[error("Wallet provider error: {0}")]
    Provider(#[from] walletdash_wallet::ProviderError),

    #[error("Observer server error: {0}")]
    Dashboard(#[from] walletdash_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] walletdash_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
