//! Shared state observed by the UI surface.
//!
//! Two `watch` channels: the wallet connection state and the dashboard view.
//! Writers are the connection manager and the request coordinator; every
//! other component only subscribes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use walletdash_core::{Address, DashboardSnapshot, ErrorInfo, Notice, WalletConnectionState};

/// Where the published dashboard data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Nothing published for this session yet.
    #[default]
    None,
    /// Fetched from the backend during this session.
    Fresh,
    /// Served from a fresh cache entry without fetching.
    Cache,
    /// Fetch failed; a stale cache entry was served instead.
    StaleFallback,
}

/// Dashboard data as seen by observers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub address: Option<Address>,
    pub snapshot: Option<DashboardSnapshot>,
    pub source: DataSource,
    /// Whether the snapshot's own timestamp is recent.
    pub snapshot_is_fresh: bool,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
    pub updated_at_ms: u64,
}

impl DashboardView {
    /// Empty view for a newly active address.
    pub fn for_address(address: Address, now_ms: u64) -> Self {
        Self {
            address: Some(address),
            updated_at_ms: now_ms,
            ..Self::default()
        }
    }
}

/// Handles to the shared watch channels. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SharedState {
    connection: Arc<watch::Sender<WalletConnectionState>>,
    dashboard: Arc<watch::Sender<DashboardView>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        let (connection, _) = watch::channel(WalletConnectionState::disconnected());
        let (dashboard, _) = watch::channel(DashboardView::default());
        Self {
            connection: Arc::new(connection),
            dashboard: Arc::new(dashboard),
        }
    }

    pub fn connection(&self) -> WalletConnectionState {
        self.connection.borrow().clone()
    }

    pub fn dashboard(&self) -> DashboardView {
        self.dashboard.borrow().clone()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<WalletConnectionState> {
        self.connection.subscribe()
    }

    pub fn subscribe_dashboard(&self) -> watch::Receiver<DashboardView> {
        self.dashboard.subscribe()
    }

    pub(crate) fn update_connection(&self, f: impl FnOnce(&mut WalletConnectionState)) {
        self.connection.send_modify(f);
    }

    /// Apply `f`; observers are only notified if it returns true.
    pub(crate) fn update_connection_if(
        &self,
        f: impl FnOnce(&mut WalletConnectionState) -> bool,
    ) -> bool {
        self.connection.send_if_modified(f)
    }

    pub(crate) fn update_dashboard_if(&self, f: impl FnOnce(&mut DashboardView) -> bool) -> bool {
        self.dashboard.send_if_modified(f)
    }

    pub(crate) fn replace_dashboard(&self, view: DashboardView) {
        self.dashboard.send_replace(view);
    }

    /// Publish a connection error and arm its auto-clear timer.
    pub(crate) fn raise_connection_error(&self, error: ErrorInfo, display: Duration) {
        let id = error.id;
        self.update_connection(|s| {
            s.last_error = Some(error);
            s.is_connecting = false;
        });
        self.clear_after(display, move |state| {
            state.update_connection_if(|s| {
                let matches = s.last_error.as_ref().is_some_and(|e| e.id == id);
                if matches {
                    s.last_error = None;
                }
                matches
            });
        });
    }

    /// Publish an advisory and arm its auto-clear timer.
    pub(crate) fn raise_advisory(&self, notice: Notice, display: Duration) {
        let id = notice.id;
        self.update_connection(|s| s.advisory = Some(notice));
        self.clear_after(display, move |state| {
            state.update_connection_if(|s| {
                let matches = s.advisory.as_ref().is_some_and(|n| n.id == id);
                if matches {
                    s.advisory = None;
                }
                matches
            });
        });
    }

    /// Arm the auto-clear timer for a dashboard error already published.
    pub(crate) fn expire_dashboard_error(&self, id: u64, display: Duration) {
        self.clear_after(display, move |state| {
            state.update_dashboard_if(|v| {
                let matches = v.error.as_ref().is_some_and(|e| e.id == id);
                if matches {
                    v.error = None;
                }
                matches
            });
        });
    }

    /// Run `clear` after `display`, unless `display` is zero.
    ///
    /// Each notice carries a unique id, so a timer never removes a newer
    /// message that replaced the one it was armed for.
    fn clear_after(&self, display: Duration, clear: impl FnOnce(&SharedState) + Send + 'static) {
        if display.is_zero() {
            return;
        }
        let state = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(display).await;
            clear(&state);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletdash_core::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_connection_error_auto_clears() {
        let state = SharedState::new();
        state.raise_connection_error(
            ErrorInfo::new(ErrorKind::UserRejected, "rejected", 0),
            Duration::from_secs(8),
        );
        assert!(state.connection().last_error.is_some());

        tokio::time::sleep(Duration::from_millis(7_999)).await;
        assert!(state.connection().last_error.is_some());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(state.connection().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_does_not_clear_newer_error() {
        let state = SharedState::new();
        state.raise_connection_error(
            ErrorInfo::new(ErrorKind::UserRejected, "first", 0),
            Duration::from_secs(5),
        );
        tokio::time::sleep(Duration::from_secs(3)).await;
        state.raise_connection_error(
            ErrorInfo::new(ErrorKind::ProviderError, "second", 3_000),
            Duration::from_secs(5),
        );

        // First timer fires at t=5s and must leave the second error alone.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let error = state.connection().last_error.unwrap();
        assert_eq!(error.message, "second");

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(state.connection().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_display_keeps_advisory() {
        let state = SharedState::new();
        state.raise_advisory(Notice::new("revocation failed", 0), Duration::ZERO);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(state.connection().advisory.is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let state = SharedState::new();
        let mut rx = state.subscribe_connection();
        state.update_connection(|s| s.is_connecting = true);
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_connecting);

        // No-op updates do not notify.
        assert!(!state.update_connection_if(|_| false));
        assert!(!rx.has_changed().unwrap());
    }
}
