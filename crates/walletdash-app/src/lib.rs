//! walletdash application.
//!
//! Wires the wallet provider, dashboard client, durable cache, session
//! manager and observer server together, and rebuilds all of them whenever
//! the session has to restart.

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, SessionEnd};
pub use config::{AppConfig, CacheConfig, WalletConfig};
pub use error::{AppError, AppResult};
