//! Wallet session and dashboard data synchronization.
//!
//! - [`WalletConnectionManager`]: canonical connection state, provider
//!   events, session restarts
//! - [`DashboardRequestCoordinator`]: single-flight, rate-limited dashboard
//!   loads with cache and stale fallback
//! - [`SharedState`]: watch channels the UI surface observes

pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use coordinator::{
    DashboardRequestCoordinator, LoadHandle, LoadOutcome, RequestCoordinatorState, SkipReason,
};
pub use error::{SyncError, SyncResult, FETCH_FAILED_MESSAGE};
pub use manager::{RestartReason, WalletConnectionManager};
pub use state::{DashboardView, DataSource, SharedState};
