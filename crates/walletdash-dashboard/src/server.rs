//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use walletdash_sync::SyncError;
use walletdash_telemetry::Metrics;

use crate::broadcast::run_broadcaster;
use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::ObserverState;
use crate::types::{ActionResponse, ObserverMessage};

/// Buffer for slow WebSocket clients. Lagging clients skip ahead; the next
/// update carries full state for the part that changed.
const BROADCAST_CAPACITY: usize = 64;

/// Limits concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                Metrics::observer_connected();
                return Some(ConnectionGuard {
                    limiter: Arc::clone(self),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

/// Holds one connection slot for the lifetime of a WebSocket.
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
        Metrics::observer_disconnected();
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    observer: ObserverState,
    broadcast_tx: broadcast::Sender<String>,
    connection_limiter: Arc<ConnectionLimiter>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        observer: ObserverState,
        broadcast_tx: broadcast::Sender<String>,
        config: &DashboardConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            observer,
            broadcast_tx,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            shutdown,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/api/state", get(get_state))
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/force-disconnect", post(force_disconnect))
        .route("/api/refresh", post(refresh))
        .route("/api/error/clear", post(clear_error))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn status_for(err: &SyncError) -> StatusCode {
    match err {
        SyncError::WalletUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::UserRejected => StatusCode::FORBIDDEN,
        SyncError::RequestAlreadyPending | SyncError::Superseded | SyncError::NotConnected => {
            StatusCode::CONFLICT
        }
        SyncError::Provider(_) | SyncError::Fetch(_) => StatusCode::BAD_GATEWAY,
        SyncError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn action_error(err: &SyncError) -> Response {
    let message = match err.kind() {
        Some(_) => err.user_message(),
        None => err.to_string(),
    };
    (status_for(err), Json(ActionResponse::failed(message))).into_response()
}

async fn health() -> &'static str {
    "ok"
}

async fn get_metrics() -> Response {
    match Metrics::encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_state(State(state): State<AppState>) -> Json<crate::types::ObserverSnapshot> {
    Json(state.observer.collect_snapshot())
}

/// Runs the full authorization flow; may wait on the wallet prompt.
async fn connect(State(state): State<AppState>) -> Response {
    match state.observer.manager().connect().await {
        Ok(address) => Json(ActionResponse {
            address: Some(address),
            ..ActionResponse::ok()
        })
        .into_response(),
        Err(e) => action_error(&e),
    }
}

async fn disconnect(State(state): State<AppState>) -> Json<ActionResponse> {
    state.observer.manager().disconnect();
    Json(ActionResponse::ok())
}

async fn force_disconnect(State(state): State<AppState>) -> Response {
    match state.observer.manager().force_disconnect() {
        Ok(()) => Json(ActionResponse::ok()).into_response(),
        Err(e) => action_error(&e),
    }
}

/// Forced reload; responds once the load reaches a terminal outcome.
async fn refresh(State(state): State<AppState>) -> Response {
    let handle = match state.observer.manager().refresh() {
        Ok(handle) => handle,
        Err(e) => return action_error(&e),
    };
    let outcome = handle.outcome().await;
    Json(ActionResponse {
        outcome: Some(outcome.label()),
        ..ActionResponse::ok()
    })
    .into_response()
}

async fn clear_error(State(state): State<AppState>) -> Json<ActionResponse> {
    state.observer.manager().clear_error();
    Json(ActionResponse::ok())
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.connection_limiter.try_acquire() else {
        warn!(
            current = state.connection_limiter.current_count(),
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "New WebSocket connection"
    );
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

/// Handle a WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so no change falls between the two.
    let mut broadcast_rx = state.broadcast_tx.subscribe();

    let initial = ObserverMessage::Snapshot(state.observer.collect_snapshot());
    match serde_json::to_string(&initial) {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("Failed to send initial snapshot, client disconnected");
                return;
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize observer snapshot");
            return;
        }
    }

    // Pongs are answered by axum; only watch for close.
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("Client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("Failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, catching up");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("Incoming task completed, closing connection");
                break;
            }
            _ = state.shutdown.cancelled() => {
                if let Err(e) = sender.send(Message::Close(None)).await {
                    debug!(error = %e, "Failed to send close frame");
                }
                break;
            }
        }
    }
    incoming_task.abort();

    info!(
        connections = state.connection_limiter.current_count().saturating_sub(1),
        "WebSocket connection closed"
    );
}

/// Serve on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    observer: ObserverState,
    config: &DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let (broadcast_tx, _) = broadcast::channel::<String>(BROADCAST_CAPACITY);
    let state = AppState::new(
        observer.clone(),
        broadcast_tx.clone(),
        config,
        shutdown.clone(),
    );
    let app = create_router(state);

    tokio::spawn(run_broadcaster(observer, broadcast_tx, shutdown.clone()));

    info!(addr = %listener.local_addr()?, "Starting observer server");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("Observer server stopped");
    Ok(())
}

/// Bind the configured address and serve until `shutdown` fires.
pub async fn run_server(
    observer: ObserverState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DashboardError::Bind { addr, source })?;
    serve(listener, observer, &config, shutdown).await
}
