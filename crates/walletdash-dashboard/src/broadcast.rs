//! WebSocket broadcast.
//!
//! Forwards every change of the connection state or dashboard view to all
//! connected WebSocket clients, as a partial `update` message.

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::ObserverState;
use crate::types::ObserverMessage;

/// Run the broadcaster until `shutdown` fires or the state is dropped.
pub async fn run_broadcaster(
    state: ObserverState,
    tx: broadcast::Sender<String>,
    shutdown: CancellationToken,
) {
    let mut connection_rx = state.subscribe_connection();
    let mut dashboard_rx = state.subscribe_dashboard();

    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = connection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                ObserverMessage::Update {
                    timestamp_ms: Utc::now().timestamp_millis(),
                    connection: Some(connection_rx.borrow_and_update().clone()),
                    dashboard: None,
                }
            }
            changed = dashboard_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                ObserverMessage::Update {
                    timestamp_ms: Utc::now().timestamp_millis(),
                    connection: None,
                    dashboard: Some(dashboard_rx.borrow_and_update().clone()),
                }
            }
        };

        match serde_json::to_string(&msg) {
            // No receivers is normal when no clients are connected.
            Ok(json) => match tx.send(json) {
                Ok(n) => trace!(receivers = n, "Broadcast update sent"),
                Err(_) => trace!("No WebSocket receivers connected"),
            },
            Err(e) => debug!(error = %e, "Failed to serialize observer update"),
        }
    }
    debug!("Broadcaster stopped");
}
