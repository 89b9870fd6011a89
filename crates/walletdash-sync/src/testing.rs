//! Test doubles shared by the coordinator and manager tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use walletdash_cache::{DashboardDataCache, MemoryStore};
use walletdash_client::{DashboardFetcher, FetchError, FetchResult};
use walletdash_core::{Address, BoxFuture, DashboardSnapshot, ManualClock, WalletConnectionState};

use crate::config::SyncConfig;
use crate::coordinator::DashboardRequestCoordinator;
use crate::state::{DashboardView, SharedState};

pub(crate) const BASE_TIME_MS: u64 = 1_706_400_000_000;

pub(crate) fn addr(n: u64) -> Address {
    Address::parse(&format!("0x{n:040x}")).unwrap()
}

pub(crate) fn snapshot_for(address: &Address, timestamp: i64) -> DashboardSnapshot {
    serde_json::from_value(serde_json::json!({
        "timestamp": timestamp,
        "wallet_address": address.as_str(),
        "portfolio": {"wallet_address": address.as_str(), "transaction_count": 1}
    }))
    .unwrap()
}

/// Fetcher with scripted failures and a gate that holds requests open.
pub(crate) struct ScriptedFetcher {
    failures: Mutex<VecDeque<FetchError>>,
    fail_all: AtomicBool,
    held: AtomicBool,
    gate: Semaphore,
    next_timestamp: AtomicI64,
    calls: Mutex<Vec<Address>>,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            fail_all: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            next_timestamp: AtomicI64::new((BASE_TIME_MS / 1000) as i64),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_next(&self, error: FetchError) {
        self.failures.lock().push_back(error);
    }

    pub(crate) fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Make new fetches wait for [`release`](Self::release).
    pub(crate) fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Stop holding new fetches.
    pub(crate) fn unhold(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    /// Let `n` held fetches proceed.
    pub(crate) fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub(crate) fn calls(&self) -> Vec<Address> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl DashboardFetcher for ScriptedFetcher {
    fn fetch(&self, address: Address) -> BoxFuture<'_, FetchResult<DashboardSnapshot>> {
        Box::pin(async move {
            self.calls.lock().push(address.clone());
            if self.held.load(Ordering::SeqCst) {
                if let Ok(permit) = self.gate.acquire().await {
                    permit.forget();
                }
            }
            if let Some(error) = self.failures.lock().pop_front() {
                return Err(error);
            }
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(FetchError::Status {
                    status: 500,
                    body: "Internal Server Error".to_string(),
                });
            }
            let timestamp = self.next_timestamp.fetch_add(1, Ordering::SeqCst);
            Ok(snapshot_for(&address, timestamp))
        })
    }
}

/// Coordinator wired to in-memory collaborators.
pub(crate) struct Harness {
    pub(crate) coordinator: Arc<DashboardRequestCoordinator>,
    pub(crate) fetcher: Arc<ScriptedFetcher>,
    pub(crate) cache: Arc<DashboardDataCache>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) state: SharedState,
    pub(crate) config: SyncConfig,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_config(SyncConfig {
            fetch_error_display_ms: 50,
            error_display_ms: 50,
            advisory_display_ms: 50,
            ..SyncConfig::default()
        })
    }

    pub(crate) fn with_config(config: SyncConfig) -> Self {
        let clock = Arc::new(ManualClock::new(BASE_TIME_MS));
        let cache = Arc::new(DashboardDataCache::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            config.cache_ttl_ms,
        ));
        let fetcher = Arc::new(ScriptedFetcher::new());
        let state = SharedState::new();
        let coordinator = Arc::new(DashboardRequestCoordinator::new(
            fetcher.clone(),
            cache.clone(),
            state.clone(),
            clock.clone(),
            config.clone(),
        ));
        Self {
            coordinator,
            fetcher,
            cache,
            clock,
            state,
            config,
        }
    }
}

/// Wait until the dashboard view satisfies `pred`.
pub(crate) async fn wait_for_dashboard(
    state: &SharedState,
    pred: impl Fn(&DashboardView) -> bool,
) -> DashboardView {
    let mut rx = state.subscribe_dashboard();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let view = rx.borrow_and_update().clone();
            if pred(&view) {
                return view;
            }
            if rx.changed().await.is_err() {
                panic!("dashboard channel closed");
            }
        }
    })
    .await
    .expect("dashboard view condition not reached")
}

/// Wait until the connection state satisfies `pred`.
pub(crate) async fn wait_for_connection(
    state: &SharedState,
    pred: impl Fn(&WalletConnectionState) -> bool,
) -> WalletConnectionState {
    let mut rx = state.subscribe_connection();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            if rx.changed().await.is_err() {
                panic!("connection channel closed");
            }
        }
    })
    .await
    .expect("connection state condition not reached")
}
