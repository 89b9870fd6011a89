//! Observer state.
//!
//! Thin read side over the connection manager: collects snapshots and hands
//! out change subscriptions. All mutation goes through the manager.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use walletdash_core::WalletConnectionState;
use walletdash_sync::{DashboardView, WalletConnectionManager};

use crate::types::ObserverSnapshot;

#[derive(Clone)]
pub struct ObserverState {
    manager: Arc<WalletConnectionManager>,
}

impl ObserverState {
    pub fn new(manager: Arc<WalletConnectionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<WalletConnectionManager> {
        &self.manager
    }

    pub fn collect_snapshot(&self) -> ObserverSnapshot {
        let shared = self.manager.state();
        ObserverSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            connection: shared.connection(),
            dashboard: shared.dashboard(),
            requests: self.manager.coordinator().snapshot_state(),
        }
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<WalletConnectionState> {
        self.manager.state().subscribe_connection()
    }

    pub fn subscribe_dashboard(&self) -> watch::Receiver<DashboardView> {
        self.manager.state().subscribe_dashboard()
    }
}
