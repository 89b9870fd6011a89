//! Connection state and observer-facing error types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Address;

static NEXT_NOTICE_ID: AtomicU64 = AtomicU64::new(1);

fn next_notice_id() -> u64 {
    NEXT_NOTICE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Network the wallet is currently pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub name: String,
}

impl NetworkInfo {
    /// Build network info from an EIP-155 chain id, naming well-known chains.
    pub fn from_chain_id(chain_id: u64) -> Self {
        let name = match chain_id {
            1 => "mainnet",
            5 => "goerli",
            10 => "optimism",
            56 => "bnb",
            137 => "matic",
            8453 => "base",
            42161 => "arbitrum",
            17000 => "holesky",
            11155111 => "sepolia",
            _ => "unknown",
        };
        Self {
            chain_id,
            name: name.to_string(),
        }
    }
}

/// Category of a surfaced error.
///
/// Corrupt cache entries are deliberately absent: they are always a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No wallet provider capability present.
    WalletUnavailable,
    /// The user declined the authorization prompt.
    UserRejected,
    /// The wallet already has an authorization request open.
    RequestAlreadyPending,
    /// Any other provider failure.
    ProviderError,
    /// Dashboard fetch failed and no cached data existed.
    FetchFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WalletUnavailable => write!(f, "WALLET_UNAVAILABLE"),
            Self::UserRejected => write!(f, "USER_REJECTED"),
            Self::RequestAlreadyPending => write!(f, "REQUEST_ALREADY_PENDING"),
            Self::ProviderError => write!(f, "PROVIDER_ERROR"),
            Self::FetchFailed => write!(f, "FETCH_FAILED"),
        }
    }
}

/// Ephemeral error shown to observers until cleared or expired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Unique id; auto-clear timers only remove the error they were armed for.
    pub id: u64,
    pub kind: ErrorKind,
    pub message: String,
    pub raised_at_ms: u64,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>, raised_at_ms: u64) -> Self {
        Self {
            id: next_notice_id(),
            kind,
            message: message.into(),
            raised_at_ms,
        }
    }
}

/// Non-fatal advisory message (e.g. permission revocation failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: u64,
    pub message: String,
    pub raised_at_ms: u64,
}

impl Notice {
    pub fn new(message: impl Into<String>, raised_at_ms: u64) -> Self {
        Self {
            id: next_notice_id(),
            message: message.into(),
            raised_at_ms,
        }
    }
}

/// Canonical wallet connection state.
///
/// Mutated only by the connection manager; starts disconnected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletConnectionState {
    pub is_connected: bool,
    pub address: Option<Address>,
    /// Native balance in ether.
    pub balance: Decimal,
    pub network: Option<NetworkInfo>,
    pub is_connecting: bool,
    pub last_error: Option<ErrorInfo>,
    #[serde(default)]
    pub advisory: Option<Notice>,
}

impl WalletConnectionState {
    /// Initial (disconnected) state.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Address of the connected account, if any.
    pub fn active_address(&self) -> Option<&Address> {
        if self.is_connected {
            self.address.as_ref()
        } else {
            None
        }
    }
}
