//! Core domain types for walletdash.
//!
//! This crate provides the types shared by every layer of the wallet-session
//! and dashboard synchronization stack:
//! - `Address`: normalized wallet address, the partition key for all state
//! - `WalletConnectionState`, `NetworkInfo`: canonical connection state
//! - `ErrorInfo`, `Notice`: ephemeral, observer-facing error reporting
//! - `DashboardSnapshot`: the dashboard document served by the backend
//! - `Clock`: time source, swappable in tests

pub mod address;
pub mod clock;
pub mod error;
pub mod snapshot;
pub mod types;

pub use address::Address;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, Result};
pub use snapshot::{
    DashboardSnapshot, Holding, MarketData, Portfolio, TransactionSummary, SNAPSHOT_MAX_AGE_SECS,
};
pub use types::{ErrorInfo, ErrorKind, NetworkInfo, Notice, WalletConnectionState};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
