//! Observer API types.
//!
//! These types are used for JSON serialization in REST and WebSocket APIs.

use serde::Serialize;
use walletdash_core::{Address, WalletConnectionState};
use walletdash_sync::{DashboardView, RequestCoordinatorState};

/// Full observer snapshot (sent on WebSocket connect and via REST).
#[derive(Debug, Clone, Serialize)]
pub struct ObserverSnapshot {
    /// Time the snapshot was taken (Unix milliseconds).
    pub timestamp_ms: i64,
    pub connection: WalletConnectionState,
    pub dashboard: DashboardView,
    pub requests: RequestCoordinatorState,
}

/// WebSocket message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverMessage {
    /// Full state, sent once per connection.
    Snapshot(ObserverSnapshot),
    /// Partial update; only the part that changed is present.
    Update {
        timestamp_ms: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        connection: Option<WalletConnectionState>,
        #[serde(skip_serializing_if = "Option::is_none")]
        dashboard: Option<DashboardView>,
    },
}

/// Body returned by the control endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}
