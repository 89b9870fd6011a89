//! Wallet provider error types.

use thiserror::Error;

/// EIP-1193 "User Rejected Request".
pub const CODE_USER_REJECTED: i64 = 4001;

/// Request of the same type already pending (MetaMask convention).
pub const CODE_REQUEST_PENDING: i64 = -32002;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Request already pending: {0}")]
    RequestAlreadyPending(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider returned no accounts")]
    NoAccounts,
}

impl ProviderError {
    /// Classify a JSON-RPC error object.
    ///
    /// Codes win; wallets that only set a message are matched on its text.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            CODE_USER_REJECTED => Self::UserRejected,
            CODE_REQUEST_PENDING => Self::RequestAlreadyPending(message),
            _ => {
                let lower = message.to_ascii_lowercase();
                if lower.contains("user rejected") || lower.contains("user denied") {
                    Self::UserRejected
                } else if lower.contains("already pending") {
                    Self::RequestAlreadyPending(message)
                } else {
                    Self::Rpc { code, message }
                }
            }
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_by_code() {
        assert_eq!(
            ProviderError::from_rpc(4001, "whatever"),
            ProviderError::UserRejected
        );
        assert!(matches!(
            ProviderError::from_rpc(-32002, "Already processing eth_requestAccounts"),
            ProviderError::RequestAlreadyPending(_)
        ));
        assert!(matches!(
            ProviderError::from_rpc(-32603, "Internal error"),
            ProviderError::Rpc { code: -32603, .. }
        ));
    }

    #[test]
    fn test_classification_by_message() {
        assert_eq!(
            ProviderError::from_rpc(-32000, "MetaMask: User denied account authorization"),
            ProviderError::UserRejected
        );
        assert!(matches!(
            ProviderError::from_rpc(-32000, "request already pending"),
            ProviderError::RequestAlreadyPending(_)
        ));
    }
}
