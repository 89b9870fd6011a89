//! walletdash-dashboard - observer and control surface.
//!
//! Exposes the wallet session to local UIs and tooling:
//!
//! - REST API for the current connection state and dashboard view
//! - WebSocket pushing an update whenever either changes
//! - Control endpoints mapping onto the connection manager
//! - Prometheus metrics exposition
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      walletdash session                      │
//! │                                                              │
//! │  ┌─────────────────────────┐   ┌──────────────────────────┐  │
//! │  │ WalletConnectionManager │──▶│ SharedState (watch x2)   │  │
//! │  └────────────▲────────────┘   └────────────┬─────────────┘  │
//! │               │ actions                     │ changes        │
//! │  ┌────────────┴─────────────────────────────▼─────────────┐  │
//! │  │ axum server                                            │  │
//! │  │  GET  /api/state           → JSON snapshot             │  │
//! │  │  GET  /ws                  → snapshot, then updates    │  │
//! │  │  POST /api/connect, /api/disconnect, /api/refresh, ... │  │
//! │  │  GET  /metrics, /health                                │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod broadcast;
mod config;
mod error;
mod server;
mod state;
mod types;

pub use broadcast::run_broadcaster;
pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, serve, AppState, ConnectionLimiter};
pub use state::ObserverState;
pub use types::{ActionResponse, ObserverMessage, ObserverSnapshot};
