//! Session supervisor.
//!
//! One session is the full component graph: provider, cache, client,
//! coordinator, manager, event pump and observer server. A chain change or
//! forced disconnect ends the session; everything is torn down and rebuilt
//! from configuration, so no in-memory state carries over. Only the durable
//! cache survives a restart (and a forced disconnect has already cleared it).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walletdash_cache::{DashboardDataCache, FileStore};
use walletdash_client::DashboardClient;
use walletdash_core::{Clock, SystemClock};
use walletdash_dashboard::{run_server, ObserverState};
use walletdash_sync::{
    DashboardRequestCoordinator, RestartReason, SharedState, WalletConnectionManager,
};
use walletdash_wallet::{DynWalletProvider, JsonRpcWalletProvider};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Capacity of the provider event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long a stopping session waits for its server and event loop.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Restart(RestartReason),
    Shutdown,
}

/// Main application.
pub struct Application {
    config: AppConfig,
}

/// Running component graph of one session.
struct Session {
    manager: Arc<WalletConnectionManager>,
    restart_rx: mpsc::Receiver<RestartReason>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run sessions until ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        let stop = CancellationToken::new();
        let ctrl_c = stop.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => ctrl_c.cancel(),
                Err(e) => error!(error = %e, "Failed to listen for ctrl-c"),
            }
        });
        self.run_until(stop).await
    }

    /// Run sessions until `stop` is cancelled.
    pub async fn run_until(self, stop: CancellationToken) -> AppResult<()> {
        let mut restore = self.config.wallet.auto_reconnect;
        let mut generation = 0u64;
        loop {
            generation += 1;
            info!(generation, restore, "Starting session");
            let session = self.build_session()?;
            match self.supervise(session, restore, &stop).await {
                SessionEnd::Restart(reason) => {
                    info!(generation, reason = reason.label(), "Session restarting");
                    // A forced disconnect must come back disconnected.
                    restore = self.config.wallet.auto_reconnect
                        && reason != RestartReason::ForcedDisconnect;
                }
                SessionEnd::Shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
            }
        }
    }

    fn build_provider(&self) -> AppResult<Option<DynWalletProvider>> {
        let Some(url) = &self.config.wallet.rpc_url else {
            warn!("No wallet RPC configured; connecting will report no wallet available");
            return Ok(None);
        };
        let provider = JsonRpcWalletProvider::new(url.clone(), self.config.wallet.poll_interval())?;
        Ok(Some(Arc::new(provider)))
    }

    fn build_session(&self) -> AppResult<Session> {
        let config = &self.config;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store = Arc::new(FileStore::open(&config.cache.dir)?);
        let cache = Arc::new(DashboardDataCache::new(
            store,
            clock.clone(),
            config.sync.cache_ttl_ms,
        ));
        let client = Arc::new(DashboardClient::new(
            config.dashboard_url.clone(),
            config.sync.fetch_timeout(),
        )?);
        let provider = self.build_provider()?;

        let state = SharedState::new();
        let coordinator = Arc::new(DashboardRequestCoordinator::new(
            client.clone(),
            cache,
            state.clone(),
            clock.clone(),
            config.sync.clone(),
        ));
        let (restart_tx, restart_rx) = mpsc::channel(1);
        let manager = Arc::new(WalletConnectionManager::new(
            provider,
            coordinator,
            state,
            clock,
            config.sync.clone(),
            restart_tx,
        ));

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        {
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    result = client.health() => {
                        if let Err(e) = result {
                            warn!(
                                url = client.base_url(),
                                error = %e,
                                "Dashboard backend health check failed; loads will fall back to cache"
                            );
                        }
                    }
                }
            }));
        }

        if let Some((events, subscription)) = manager.subscribe_events(EVENT_CHANNEL_CAPACITY) {
            let manager = Arc::clone(&manager);
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                // Keep the subscription alive for the session.
                let _subscription = subscription;
                manager.run(events, shutdown).await;
            }));
        }

        if config.server.enabled {
            let observer = ObserverState::new(Arc::clone(&manager));
            let server_config = config.server.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = run_server(observer, server_config, shutdown).await {
                    error!(error = %e, "Observer server failed");
                }
            }));
        }

        Ok(Session {
            manager,
            restart_rx,
            shutdown,
            tasks,
        })
    }

    async fn supervise(
        &self,
        mut session: Session,
        restore: bool,
        stop: &CancellationToken,
    ) -> SessionEnd {
        if restore {
            match session.manager.restore().await {
                Ok(Some(address)) => info!(address = %address.short(), "Restored wallet session"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Could not restore wallet session"),
            }
        }

        let end = tokio::select! {
            _ = stop.cancelled() => SessionEnd::Shutdown,
            Some(reason) = session.restart_rx.recv() => SessionEnd::Restart(reason),
        };

        session.shutdown.cancel();
        for mut task in session.tasks {
            if tokio::time::timeout(TEARDOWN_TIMEOUT, &mut task).await.is_err() {
                warn!("Session task did not stop in time, aborting");
                task.abort();
            }
        }

        // The next session's coordinator must not fetch while this one still is.
        let coordinator = session.manager.coordinator();
        if tokio::time::timeout(TEARDOWN_TIMEOUT, coordinator.shutdown())
            .await
            .is_err()
        {
            warn!("Dashboard fetch did not release its lock in time");
        } else {
            debug!("Dashboard coordinator stopped");
        }
        end
    }
}
