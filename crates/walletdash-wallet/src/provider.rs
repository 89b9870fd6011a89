//! Wallet provider trait and push events.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walletdash_core::{Address, BoxFuture};

use crate::error::ProviderResult;

/// Event pushed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Authorized accounts changed. Empty means the wallet disconnected.
    AccountsChanged(Vec<Address>),
    /// Active chain changed.
    ChainChanged(u64),
}

impl ProviderEvent {
    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountsChanged(_) => "accounts_changed",
            Self::ChainChanged(_) => "chain_changed",
        }
    }
}

/// Live event subscription. Dropping the handle ends it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Wallet capability.
///
/// Every call may fail, be rejected by the user, or never resolve.
pub trait WalletProvider: Send + Sync {
    /// Authorization flow (`eth_requestAccounts`). May prompt the user.
    fn request_accounts(&self) -> BoxFuture<'_, ProviderResult<Vec<Address>>>;

    /// Currently authorized accounts without prompting (`eth_accounts`).
    fn accounts(&self) -> BoxFuture<'_, ProviderResult<Vec<Address>>>;

    /// Native balance in ether.
    fn balance(&self, address: Address) -> BoxFuture<'_, ProviderResult<Decimal>>;

    /// Active EIP-155 chain id.
    fn chain_id(&self) -> BoxFuture<'_, ProviderResult<u64>>;

    /// Revoke the site's account permission (`wallet_revokePermissions`).
    fn revoke_permissions(&self) -> BoxFuture<'_, ProviderResult<()>>;

    /// Start delivering push events into `sink`.
    fn subscribe(&self, sink: mpsc::Sender<ProviderEvent>) -> SubscriptionHandle;
}

/// Arc wrapper for WalletProvider trait objects.
pub type DynWalletProvider = Arc<dyn WalletProvider>;
