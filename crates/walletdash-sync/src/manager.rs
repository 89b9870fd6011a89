//! Wallet connection manager.
//!
//! Owns the canonical [`WalletConnectionState`] and mediates every
//! connect/disconnect/account/chain transition against the wallet provider.
//! Provider events are consumed in arrival order from a single channel;
//! each one fully resets the session and starts its own load before the
//! next is looked at.
//!
//! Every provider call may hang. Results are committed only if the session
//! epoch they were issued under is still current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walletdash_core::{Address, Clock, ErrorInfo, NetworkInfo, Notice, WalletConnectionState};
use walletdash_telemetry::Metrics;
use walletdash_wallet::{
    DynWalletProvider, ProviderError, ProviderEvent, SubscriptionHandle, WalletProvider,
};

use crate::config::SyncConfig;
use crate::coordinator::{DashboardRequestCoordinator, LoadHandle};
use crate::error::{SyncError, SyncResult};
use crate::state::SharedState;

/// Bound on non-interactive provider queries (accounts, balance, chain).
const PROVIDER_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

const REVOKE_TIMEOUT: Duration = Duration::from_secs(10);

const REVOKE_ADVISORY: &str = "Disconnected locally, but the wallet did not confirm revoking \
access. Use force disconnect to clear all local data.";

/// Why the session must be rebuilt from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    ChainChanged(u64),
    ForcedDisconnect,
}

impl RestartReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChainChanged(_) => "chain_changed",
            Self::ForcedDisconnect => "forced_disconnect",
        }
    }
}

/// Clears `is_connecting` when a connect attempt ends, however it ends.
struct ConnectingGuard<'a> {
    state: &'a SharedState,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .update_connection_if(|s| std::mem::take(&mut s.is_connecting));
    }
}

async fn resolve_details(
    provider: &dyn WalletProvider,
    address: &Address,
) -> SyncResult<(Decimal, NetworkInfo)> {
    let balance = provider.balance(address.clone()).await?;
    let chain_id = provider.chain_id().await?;
    Ok((balance, NetworkInfo::from_chain_id(chain_id)))
}

async fn authorize(provider: &dyn WalletProvider) -> SyncResult<(Address, Decimal, NetworkInfo)> {
    let accounts = provider.request_accounts().await?;
    let address = accounts
        .into_iter()
        .next()
        .ok_or(SyncError::from(ProviderError::NoAccounts))?;
    let (balance, network) = resolve_details(provider, &address).await?;
    Ok((address, balance, network))
}

/// Mediates wallet connection lifecycle.
pub struct WalletConnectionManager {
    provider: Option<DynWalletProvider>,
    coordinator: Arc<DashboardRequestCoordinator>,
    state: SharedState,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    /// Bumped on every session change; async results carry the value they
    /// were issued under.
    epoch: Arc<AtomicU64>,
    restart_tx: mpsc::Sender<RestartReason>,
}

impl WalletConnectionManager {
    pub fn new(
        provider: Option<DynWalletProvider>,
        coordinator: Arc<DashboardRequestCoordinator>,
        state: SharedState,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
        restart_tx: mpsc::Sender<RestartReason>,
    ) -> Self {
        Self {
            provider,
            coordinator,
            state,
            clock,
            config,
            epoch: Arc::new(AtomicU64::new(0)),
            restart_tx,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn coordinator(&self) -> &Arc<DashboardRequestCoordinator> {
        &self.coordinator
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Subscribe to provider push events, if a provider is present.
    pub fn subscribe_events(
        &self,
        capacity: usize,
    ) -> Option<(mpsc::Receiver<ProviderEvent>, SubscriptionHandle)> {
        let provider = self.provider.as_ref()?;
        let (tx, rx) = mpsc::channel(capacity);
        Some((rx, provider.subscribe(tx)))
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Surface `err` as the connection error, if it is observer-facing.
    fn report(&self, err: &SyncError) {
        Metrics::connect_attempt(err.label());
        if let Some(kind) = err.kind() {
            let info = ErrorInfo::new(kind, err.user_message(), self.clock.now_ms());
            self.state
                .raise_connection_error(info, self.config.error_display());
        }
    }

    fn publish_connected(&self, address: Address, balance: Decimal, network: Option<NetworkInfo>) {
        self.state.update_connection(|s| {
            s.is_connected = true;
            s.address = Some(address);
            s.balance = balance;
            if network.is_some() {
                s.network = network;
            }
            s.is_connecting = false;
            s.last_error = None;
        });
        Metrics::wallet_connected();
    }

    /// Run the wallet authorization flow and start the session.
    pub async fn connect(&self) -> SyncResult<Address> {
        let Some(provider) = self.provider.clone() else {
            let err = SyncError::WalletUnavailable;
            warn!("Connect requested but no wallet provider is configured");
            self.report(&err);
            return Err(err);
        };

        let epoch = self.current_epoch();
        self.state.update_connection(|s| {
            s.is_connecting = true;
            s.last_error = None;
        });
        let _connecting = ConnectingGuard { state: &self.state };
        info!("Requesting wallet authorization");

        let timeout = self.config.connect_timeout();
        let result = match tokio::time::timeout(timeout, authorize(provider.as_ref())).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Provider(format!(
                "authorization timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        if self.current_epoch() != epoch {
            info!("Discarding connect result: session changed while authorizing");
            Metrics::connect_attempt(SyncError::Superseded.label());
            return Err(SyncError::Superseded);
        }

        match result {
            Ok((address, balance, network)) => {
                self.next_epoch();
                info!(
                    address = %address.short(),
                    chain_id = network.chain_id,
                    %balance,
                    "Wallet connected"
                );
                self.publish_connected(address.clone(), balance, Some(network));
                Metrics::connect_attempt("connected");
                self.coordinator.begin_session(address.clone());
                self.coordinator.spawn_load(address.clone(), false);
                Ok(address)
            }
            Err(e) => {
                warn!(error = %e, kind = e.label(), "Wallet connect failed");
                self.report(&e);
                Err(e)
            }
        }
    }

    /// Reconnect silently if the wallet already authorized an account.
    ///
    /// Never prompts. Returns `Ok(None)` when there is nothing to restore.
    pub async fn restore(&self) -> SyncResult<Option<Address>> {
        let Some(provider) = self.provider.clone() else {
            return Ok(None);
        };
        let epoch = self.current_epoch();

        let accounts = tokio::time::timeout(PROVIDER_QUERY_TIMEOUT, provider.accounts())
            .await
            .map_err(|_| SyncError::Provider("eth_accounts timed out".to_string()))??;
        let Some(address) = accounts.into_iter().next() else {
            debug!("No previously authorized account to restore");
            return Ok(None);
        };
        let (balance, network) =
            tokio::time::timeout(PROVIDER_QUERY_TIMEOUT, resolve_details(provider.as_ref(), &address))
                .await
                .map_err(|_| SyncError::Provider("account details timed out".to_string()))??;

        if self.current_epoch() != epoch {
            return Err(SyncError::Superseded);
        }
        self.next_epoch();
        info!(address = %address.short(), chain_id = network.chain_id, "Wallet session restored");
        self.publish_connected(address.clone(), balance, Some(network));
        self.coordinator.begin_session(address.clone());
        self.coordinator.spawn_load(address.clone(), false);
        Ok(Some(address))
    }

    /// Reset to disconnected. Permission revocation runs in the background
    /// and only raises an advisory if it fails.
    pub fn disconnect(&self) {
        self.next_epoch();
        let previous = self.state.connection().address;
        self.state
            .update_connection(|s| *s = WalletConnectionState::disconnected());
        self.coordinator.end_session();
        Metrics::wallet_disconnected();
        info!(
            address = ?previous.as_ref().map(Address::short),
            "Wallet disconnected"
        );

        if let Some(provider) = self.provider.clone() {
            self.spawn_revoke(provider);
        }
    }

    fn spawn_revoke(&self, provider: DynWalletProvider) {
        let state = self.state.clone();
        let clock = Arc::clone(&self.clock);
        let display = self.config.advisory_display();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(REVOKE_TIMEOUT, provider.revoke_permissions())
                .await
            {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err("timed out".to_string()),
            };
            match result {
                Ok(()) => debug!("Wallet permissions revoked"),
                Err(e) => {
                    warn!(error = %e, "Wallet permission revocation failed");
                    state.raise_advisory(Notice::new(REVOKE_ADVISORY, clock.now_ms()), display);
                }
            }
        });
    }

    /// Clear every persisted cache entry and request a full session restart.
    pub fn force_disconnect(&self) -> SyncResult<()> {
        self.next_epoch();
        self.state
            .update_connection(|s| *s = WalletConnectionState::disconnected());
        Metrics::wallet_disconnected();
        let cleared = self.coordinator.reset_all();
        warn!("Forced disconnect: local data cleared, restarting session");
        self.request_restart(RestartReason::ForcedDisconnect);
        cleared.map(|_| ()).map_err(SyncError::from)
    }

    /// Clear the connection error and any dashboard error.
    pub fn clear_error(&self) {
        let connection = self
            .state
            .update_connection_if(|s| s.last_error.take().is_some());
        let dashboard = self.state.update_dashboard_if(|v| v.error.take().is_some());
        debug!(connection, dashboard, "Errors cleared");
    }

    /// Forced reload for the active address.
    pub fn refresh(&self) -> SyncResult<LoadHandle> {
        let address = self
            .state
            .connection()
            .active_address()
            .cloned()
            .ok_or(SyncError::NotConnected)?;
        Ok(self.coordinator.spawn_load(address, true))
    }

    /// Apply one provider event. Returns once the event's effects have been
    /// initiated.
    pub async fn handle_event(&self, event: ProviderEvent) {
        let kind = event.kind();
        let applied = match event {
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            ProviderEvent::ChainChanged(chain_id) => self.on_chain_changed(chain_id),
        };
        Metrics::provider_event(kind, applied);
    }

    async fn on_accounts_changed(&self, accounts: Vec<Address>) -> bool {
        let current = self.state.connection();
        let Some(reported) = accounts.first().cloned() else {
            if current.is_connected {
                info!("Wallet reports no accounts");
                self.disconnect();
                return true;
            }
            debug!("Empty accountsChanged while disconnected; ignored");
            return false;
        };
        let Some(provider) = self.provider.clone() else {
            return false;
        };

        // Ask the wallet which account is active now rather than trusting a
        // possibly stale event payload.
        let active = match tokio::time::timeout(PROVIDER_QUERY_TIMEOUT, provider.accounts()).await
        {
            Ok(Ok(resolved)) if !resolved.is_empty() => resolved[0].clone(),
            Ok(Ok(_)) => reported,
            Ok(Err(e)) => {
                debug!(error = %e, "Could not re-resolve active account; using event payload");
                reported
            }
            Err(_) => {
                debug!("Re-resolving active account timed out; using event payload");
                reported
            }
        };

        if current.is_connected && current.address.as_ref() == Some(&active) {
            debug!(address = %active.short(), "accountsChanged for the active account; ignored");
            return false;
        }

        let epoch = self.next_epoch();
        info!(
            from = ?current.address.as_ref().map(Address::short),
            to = %active.short(),
            "Active account changed"
        );
        self.coordinator.begin_session(active.clone());
        self.publish_connected(active.clone(), Decimal::ZERO, None);
        self.coordinator.spawn_load(active.clone(), true);
        self.spawn_account_details(provider, active, epoch);
        true
    }

    /// Fill in balance and network for a newly active account.
    fn spawn_account_details(&self, provider: DynWalletProvider, address: Address, epoch: u64) {
        let state = self.state.clone();
        let current_epoch = Arc::clone(&self.epoch);
        tokio::spawn(async move {
            let details = tokio::time::timeout(
                PROVIDER_QUERY_TIMEOUT,
                resolve_details(provider.as_ref(), &address),
            )
            .await;
            let (balance, network) = match details {
                Ok(Ok(details)) => details,
                Ok(Err(e)) => {
                    warn!(address = %address.short(), error = %e, "Failed to load account details");
                    return;
                }
                Err(_) => {
                    warn!(address = %address.short(), "Loading account details timed out");
                    return;
                }
            };
            if current_epoch.load(Ordering::SeqCst) != epoch {
                debug!(address = %address.short(), "Discarding account details for a superseded session");
                return;
            }
            state.update_connection_if(|s| {
                if !s.is_connected || s.address.as_ref() != Some(&address) {
                    return false;
                }
                s.balance = balance;
                s.network = Some(network);
                true
            });
        });
    }

    fn on_chain_changed(&self, chain_id: u64) -> bool {
        let current = self.state.connection();
        if current
            .network
            .as_ref()
            .is_some_and(|n| n.chain_id == chain_id)
        {
            debug!(chain_id, "chainChanged to the current chain; ignored");
            return false;
        }
        info!(
            chain_id,
            previous = ?current.network.as_ref().map(|n| n.chain_id),
            "Chain changed, restarting session"
        );
        self.request_restart(RestartReason::ChainChanged(chain_id));
        true
    }

    fn request_restart(&self, reason: RestartReason) {
        match self.restart_tx.try_send(reason) {
            Ok(()) => Metrics::session_restart(reason.label()),
            Err(TrySendError::Full(_)) => debug!(?reason, "Restart already pending"),
            Err(TrySendError::Closed(_)) => {
                warn!(?reason, "Restart requested but no supervisor is listening")
            }
        }
    }

    /// Consume provider events in order until cancelled or the stream ends.
    pub async fn run(&self, mut events: mpsc::Receiver<ProviderEvent>, shutdown: CancellationToken) {
        info!("Wallet event loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        debug!(kind = event.kind(), "Provider event");
                        self.handle_event(event).await;
                    }
                    None => {
                        info!("Provider event stream closed");
                        break;
                    }
                },
            }
        }
        info!("Wallet event loop stopped");
    }
}

impl std::fmt::Debug for WalletConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnectionManager")
            .field("has_provider", &self.provider.is_some())
            .field("epoch", &self.current_epoch())
            .finish()
    }
}
