//! Sync error types.

use thiserror::Error;
use walletdash_cache::CacheError;
use walletdash_client::FetchError;
use walletdash_core::ErrorKind;
use walletdash_wallet::ProviderError;

/// Message shown when a dashboard fetch fails with nothing cached.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to load portfolio data";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No wallet provider available")]
    WalletUnavailable,

    #[error("Connection request rejected by user")]
    UserRejected,

    #[error("A connection request is already pending in the wallet")]
    RequestAlreadyPending,

    #[error("Wallet provider error: {0}")]
    Provider(String),

    #[error("Dashboard fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("No wallet connected")]
    NotConnected,

    #[error("Wallet session changed while the request was pending")]
    Superseded,
}

impl SyncError {
    /// Observer-facing category, if this error is ever surfaced.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::WalletUnavailable => Some(ErrorKind::WalletUnavailable),
            Self::UserRejected => Some(ErrorKind::UserRejected),
            Self::RequestAlreadyPending => Some(ErrorKind::RequestAlreadyPending),
            Self::Provider(_) => Some(ErrorKind::ProviderError),
            Self::Fetch(_) => Some(ErrorKind::FetchFailed),
            Self::Cache(_) | Self::NotConnected | Self::Superseded => None,
        }
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::WalletUnavailable => {
                "No wallet found. Install or configure a wallet provider to connect.".to_string()
            }
            Self::UserRejected => "Connection request was rejected in the wallet.".to_string(),
            Self::RequestAlreadyPending => {
                "A connection request is already pending. Check your wallet.".to_string()
            }
            Self::Provider(message) => format!("Wallet error: {message}"),
            Self::Fetch(_) => FETCH_FAILED_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WalletUnavailable => "wallet_unavailable",
            Self::UserRejected => "user_rejected",
            Self::RequestAlreadyPending => "request_already_pending",
            Self::Provider(_) => "provider_error",
            Self::Fetch(_) => "fetch_failed",
            Self::Cache(_) => "cache",
            Self::NotConnected => "not_connected",
            Self::Superseded => "superseded",
        }
    }
}

impl From<ProviderError> for SyncError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UserRejected => Self::UserRejected,
            ProviderError::RequestAlreadyPending(_) => Self::RequestAlreadyPending,
            other => Self::Provider(other.to_string()),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_are_classified() {
        assert_eq!(
            SyncError::from(ProviderError::UserRejected).kind(),
            Some(ErrorKind::UserRejected)
        );
        assert_eq!(
            SyncError::from(ProviderError::RequestAlreadyPending("x".into())).kind(),
            Some(ErrorKind::RequestAlreadyPending)
        );
        let other = SyncError::from(ProviderError::Transport("connection refused".into()));
        assert_eq!(other.kind(), Some(ErrorKind::ProviderError));
        assert!(other.user_message().contains("connection refused"));
    }

    #[test]
    fn test_fetch_failure_message() {
        let err = SyncError::from(FetchError::Status {
            status: 500,
            body: String::new(),
        });
        assert_eq!(err.user_message(), FETCH_FAILED_MESSAGE);
        assert_eq!(err.kind(), Some(ErrorKind::FetchFailed));
    }
}
