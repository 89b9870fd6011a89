//! Scripted wallet provider for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use walletdash_core::{Address, BoxFuture};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ProviderEvent, SubscriptionHandle, WalletProvider};

/// Mock wallet provider.
///
/// Authorization succeeds with the scripted accounts unless a failure is
/// queued. [`hold_authorization`](Self::hold_authorization) makes the
/// authorization flow wait like an unanswered wallet prompt.
#[derive(Debug)]
pub struct MockWalletProvider {
    /// Accounts granted by the next successful authorization.
    grant: Mutex<Vec<Address>>,
    /// Currently authorized accounts (`eth_accounts`).
    accounts: Mutex<Vec<Address>>,
    authorize_error: Mutex<Option<ProviderError>>,
    revoke_error: Mutex<Option<ProviderError>>,
    balances: Mutex<HashMap<Address, Decimal>>,
    chain_id: AtomicU64,
    held: AtomicBool,
    release: Notify,
    calls: Mutex<Vec<&'static str>>,
    subscribers: Mutex<Vec<(CancellationToken, mpsc::Sender<ProviderEvent>)>>,
}

impl Default for MockWalletProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWalletProvider {
    /// Create a new mock on mainnet with no accounts.
    pub fn new() -> Self {
        Self {
            grant: Mutex::new(Vec::new()),
            accounts: Mutex::new(Vec::new()),
            authorize_error: Mutex::new(None),
            revoke_error: Mutex::new(None),
            balances: Mutex::new(HashMap::new()),
            chain_id: AtomicU64::new(1),
            held: AtomicBool::new(false),
            release: Notify::new(),
            calls: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Accounts the next authorization grants.
    pub fn set_grant(&self, accounts: Vec<Address>) {
        *self.grant.lock() = accounts;
    }

    /// Accounts reported as already authorized.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.lock() = accounts;
    }

    pub fn set_balance(&self, address: Address, balance: Decimal) {
        self.balances.lock().insert(address, balance);
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    /// Fail the next authorization with `error`.
    pub fn fail_next_authorization(&self, error: ProviderError) {
        *self.authorize_error.lock() = Some(error);
    }

    /// Fail every permission revocation with `error` (or succeed on `None`).
    pub fn set_revoke_error(&self, error: Option<ProviderError>) {
        *self.revoke_error.lock() = error;
    }

    /// Make authorizations wait until [`release_authorization`](Self::release_authorization).
    pub fn hold_authorization(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let one held authorization proceed and stop holding new ones.
    pub fn release_authorization(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Deliver `event` to every live subscriber. Returns how many got it.
    pub fn emit(&self, event: ProviderEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(token, sink)| !token.is_cancelled() && !sink.is_closed());
        subscribers
            .iter()
            .filter(|(_, sink)| sink.try_send(event.clone()).is_ok())
            .count()
    }

    /// Recorded calls, by method name.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| **m == method).count()
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().push(method);
    }
}

impl WalletProvider for MockWalletProvider {
    fn request_accounts(&self) -> BoxFuture<'_, ProviderResult<Vec<Address>>> {
        Box::pin(async move {
            self.record("eth_requestAccounts");
            if self.held.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if let Some(error) = self.authorize_error.lock().take() {
                return Err(error);
            }
            let granted = self.grant.lock().clone();
            if granted.is_empty() {
                return Err(ProviderError::NoAccounts);
            }
            *self.accounts.lock() = granted.clone();
            Ok(granted)
        })
    }

    fn accounts(&self) -> BoxFuture<'_, ProviderResult<Vec<Address>>> {
        Box::pin(async move {
            self.record("eth_accounts");
            Ok(self.accounts.lock().clone())
        })
    }

    fn balance(&self, address: Address) -> BoxFuture<'_, ProviderResult<Decimal>> {
        Box::pin(async move {
            self.record("eth_getBalance");
            Ok(self
                .balances
                .lock()
                .get(&address)
                .copied()
                .unwrap_or(Decimal::ZERO))
        })
    }

    fn chain_id(&self) -> BoxFuture<'_, ProviderResult<u64>> {
        Box::pin(async move {
            self.record("eth_chainId");
            Ok(self.chain_id.load(Ordering::SeqCst))
        })
    }

    fn revoke_permissions(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move {
            self.record("wallet_revokePermissions");
            if let Some(error) = self.revoke_error.lock().clone() {
                return Err(error);
            }
            self.accounts.lock().clear();
            Ok(())
        })
    }

    fn subscribe(&self, sink: mpsc::Sender<ProviderEvent>) -> SubscriptionHandle {
        let token = CancellationToken::new();
        self.subscribers.lock().push((token.clone(), sink));
        SubscriptionHandle::new(token)
    }
}
