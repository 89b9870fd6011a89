//! Dashboard request coordinator.
//!
//! Decides whether a load needs the network, and if so runs it under a
//! process-wide single-flight lock:
//!
//! ```text
//! IDLE -> load(addr, forced) -> DECIDE
//!   DECIDE --(inactive address | in flight)--------------> IDLE (no-op)
//!   DECIDE --(!forced && fresh cache)---------------------> IDLE (publish cache)
//!   DECIDE --(!forced && (loaded || < min interval))------> IDLE (no-op)
//!   DECIDE --(otherwise)----------------------------------> FETCHING
//!   FETCHING --(session moved on)--------------------------> IDLE (discard)
//!   FETCHING --(ok)----------------------------------------> IDLE (cache + publish)
//!   FETCHING --(err, stale entry)--------------------------> IDLE (publish stale)
//!   FETCHING --(err, nothing cached)-----------------------> IDLE (publish error)
//! ```
//!
//! The decision and lock acquisition happen synchronously in
//! [`DashboardRequestCoordinator::spawn_load`], so loads acquire the lock in
//! the order they were initiated. The lock is a RAII guard released on every
//! exit path, including task abort.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walletdash_cache::{CacheResult, DashboardDataCache};
use walletdash_client::{DashboardFetcher, FetchError, FetchResult};
use walletdash_core::{Address, Clock, DashboardSnapshot, ErrorInfo, ErrorKind};
use walletdash_telemetry::Metrics;

use crate::config::SyncConfig;
use crate::error::FETCH_FAILED_MESSAGE;
use crate::state::{DashboardView, DataSource, SharedState};

/// Why a load did not reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another fetch holds the single-flight lock.
    InFlight,
    /// Last success for this address is more recent than the minimum interval.
    RateLimited,
    /// This session already loaded successfully.
    AlreadyLoaded,
    /// Address is not the active session address.
    InactiveAddress,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InFlight => "in_flight",
            Self::RateLimited => "rate_limited",
            Self::AlreadyLoaded => "already_loaded",
            Self::InactiveAddress => "inactive_address",
        }
    }
}

/// Terminal result of one `load()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    ServedFromCache,
    Skipped(SkipReason),
    Fetched,
    /// Fetch failed; the stale cache entry was published.
    FellBackToStale,
    /// Fetch failed with nothing cached; an error was published.
    Failed,
    /// Response arrived after the active address changed.
    Discarded,
}

impl LoadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ServedFromCache => "served_from_cache",
            Self::Skipped(reason) => reason.label(),
            Self::Fetched => "fetched",
            Self::FellBackToStale => "stale_fallback",
            Self::Failed => "failed",
            Self::Discarded => "discarded",
        }
    }
}

/// Handle returned by [`DashboardRequestCoordinator::spawn_load`].
#[derive(Debug)]
pub enum LoadHandle {
    /// Decided without touching the network.
    Done(LoadOutcome),
    /// A fetch task was started.
    Fetching(JoinHandle<LoadOutcome>),
}

impl LoadHandle {
    pub fn is_fetching(&self) -> bool {
        matches!(self, Self::Fetching(_))
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> LoadOutcome {
        match self {
            Self::Done(outcome) => outcome,
            Self::Fetching(handle) => handle.await.unwrap_or_else(|e| {
                warn!(error = %e, "Dashboard fetch task did not complete");
                LoadOutcome::Failed
            }),
        }
    }
}

/// Read-only view of the coordinator bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestCoordinatorState {
    pub in_flight: bool,
    pub in_flight_address: Option<Address>,
    pub session_address: Option<Address>,
    pub has_loaded_this_session: bool,
    /// Last success for the session address.
    pub last_successful_fetch_at_ms: Option<u64>,
    pub last_attempt_at_ms: Option<u64>,
    pub request_sequence: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    address: Address,
    seq: u64,
}

#[derive(Debug, Default)]
struct FlightState {
    in_flight: Option<InFlight>,
    session: Option<Address>,
    has_loaded_this_session: bool,
    last_success_ms: HashMap<Address, u64>,
    last_attempt_ms: Option<u64>,
    request_sequence: u64,
    /// Set by `shutdown`; no session can start afterwards.
    closed: bool,
}

enum Decision {
    Settled(LoadOutcome),
    Fetch(FlightGuard),
}

/// Single-flight lock ownership. Dropping it releases the lock.
struct FlightGuard {
    coordinator: Arc<DashboardRequestCoordinator>,
    address: Address,
    seq: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.coordinator.release(self.seq);
    }
}

/// Owner of the single-flight lock, rate limiter and session-loaded flag.
///
/// The only component that writes dashboard cache entries.
pub struct DashboardRequestCoordinator {
    fetcher: Arc<dyn DashboardFetcher>,
    cache: Arc<DashboardDataCache>,
    state: SharedState,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    inner: Mutex<FlightState>,
    shutdown: CancellationToken,
    released: Notify,
}

impl DashboardRequestCoordinator {
    pub fn new(
        fetcher: Arc<dyn DashboardFetcher>,
        cache: Arc<DashboardDataCache>,
        state: SharedState,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            fetcher,
            cache,
            state,
            clock,
            config,
            inner: Mutex::new(FlightState::default()),
            shutdown: CancellationToken::new(),
            released: Notify::new(),
        }
    }

    /// Make `address` the active session address.
    ///
    /// Resets the session-loaded flag when the address changes. Cache entries
    /// of the previous address are left untouched.
    pub fn begin_session(&self, address: Address) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!(address = %address.short(), "Coordinator shut down, session not started");
            return;
        }
        if inner.session.as_ref() == Some(&address) {
            return;
        }
        info!(
            address = %address.short(),
            previous = ?inner.session.as_ref().map(Address::short),
            "Dashboard session started"
        );
        inner.session = Some(address.clone());
        inner.has_loaded_this_session = false;
        self.state
            .replace_dashboard(DashboardView::for_address(address, now));
    }

    /// Clear the active session (wallet disconnected).
    pub fn end_session(&self) {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.session.take() {
            info!(address = %previous.short(), "Dashboard session ended");
        }
        inner.has_loaded_this_session = false;
        self.state.replace_dashboard(DashboardView::default());
    }

    /// Drop every cache entry and all bookkeeping except the in-flight lock.
    ///
    /// An in-flight fetch keeps the lock until it resolves; its result is
    /// then discarded because no session is active.
    pub fn reset_all(&self) -> CacheResult<usize> {
        let mut inner = self.inner.lock();
        let removed = self.cache.invalidate_all();
        inner.session = None;
        inner.has_loaded_this_session = false;
        inner.last_success_ms.clear();
        inner.last_attempt_ms = None;
        self.state.replace_dashboard(DashboardView::default());
        warn!(removed = ?removed.as_ref().ok(), "Dashboard state reset");
        removed
    }

    /// Stop for good: end the session, cancel any in-flight fetch and wait
    /// until its lock is released.
    ///
    /// A replacement coordinator must not fetch before this returns, or two
    /// fetches could be in flight at once.
    pub async fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.session = None;
            inner.has_loaded_this_session = false;
        }
        self.shutdown.cancel();

        loop {
            let released = self.released.notified();
            if !self.is_in_flight() {
                break;
            }
            released.await;
        }
        info!("Dashboard coordinator shut down");
    }

    pub fn session_address(&self) -> Option<Address> {
        self.inner.lock().session.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    pub fn snapshot_state(&self) -> RequestCoordinatorState {
        let inner = self.inner.lock();
        RequestCoordinatorState {
            in_flight: inner.in_flight.is_some(),
            in_flight_address: inner.in_flight.as_ref().map(|f| f.address.clone()),
            session_address: inner.session.clone(),
            has_loaded_this_session: inner.has_loaded_this_session,
            last_successful_fetch_at_ms: inner
                .session
                .as_ref()
                .and_then(|a| inner.last_success_ms.get(a).copied()),
            last_attempt_at_ms: inner.last_attempt_ms,
            request_sequence: inner.request_sequence,
        }
    }

    /// Decide now; fetch (if needed) in a spawned task.
    pub fn spawn_load(self: &Arc<Self>, address: Address, forced: bool) -> LoadHandle {
        match self.decide(address, forced) {
            Decision::Settled(outcome) => LoadHandle::Done(outcome),
            Decision::Fetch(flight) => {
                let this = Arc::clone(self);
                LoadHandle::Fetching(tokio::spawn(async move { this.execute(flight).await }))
            }
        }
    }

    /// Decide and fetch inline.
    pub async fn load(self: &Arc<Self>, address: Address, forced: bool) -> LoadOutcome {
        match self.decide(address, forced) {
            Decision::Settled(outcome) => outcome,
            Decision::Fetch(flight) => self.execute(flight).await,
        }
    }

    fn skipped(address: &Address, forced: bool, reason: SkipReason) -> Decision {
        Metrics::load_decision(reason.label());
        debug!(
            address = %address.short(),
            forced,
            reason = reason.label(),
            "Dashboard load skipped"
        );
        Decision::Settled(LoadOutcome::Skipped(reason))
    }

    fn decide(self: &Arc<Self>, address: Address, forced: bool) -> Decision {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        if inner.session.as_ref() != Some(&address) {
            return Self::skipped(&address, forced, SkipReason::InactiveAddress);
        }
        if let Some(flight) = &inner.in_flight {
            debug!(in_flight = %flight.address.short(), seq = flight.seq, "Fetch in flight");
            return Self::skipped(&address, forced, SkipReason::InFlight);
        }

        if !forced {
            if let Some(snapshot) = self.cache.get(&address) {
                Metrics::load_decision("cache");
                debug!(address = %address.short(), "Serving dashboard from cache");
                self.publish(&address, Some(snapshot), DataSource::Cache, None, now);
                return Decision::Settled(LoadOutcome::ServedFromCache);
            }
            if inner.has_loaded_this_session {
                return Self::skipped(&address, forced, SkipReason::AlreadyLoaded);
            }
            if let Some(&last) = inner.last_success_ms.get(&address) {
                if now.saturating_sub(last) < self.config.min_refetch_interval_ms {
                    return Self::skipped(&address, forced, SkipReason::RateLimited);
                }
            }
        }

        inner.request_sequence += 1;
        let seq = inner.request_sequence;
        inner.in_flight = Some(InFlight {
            address: address.clone(),
            seq,
        });
        inner.last_attempt_ms = Some(now);
        Metrics::load_decision("fetch");
        info!(address = %address.short(), forced, seq, "Fetching dashboard");

        self.state.update_dashboard_if(|v| {
            let matches = v.address.as_ref() == Some(&address);
            if matches {
                v.loading = true;
            }
            matches
        });
        drop(inner);

        Decision::Fetch(FlightGuard {
            coordinator: Arc::clone(self),
            address,
            seq,
        })
    }

    async fn execute(self: &Arc<Self>, flight: FlightGuard) -> LoadOutcome {
        let address = flight.address.clone();
        let seq = flight.seq;
        let timeout = self.config.fetch_timeout();
        let started = Instant::now();

        let fetch = tokio::time::timeout(timeout, self.fetcher.fetch(address.clone()));
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => {
                drop(flight);
                Metrics::dashboard_fetch("cancelled");
                info!(address = %address.short(), seq, "Dashboard fetch cancelled by shutdown");
                return LoadOutcome::Discarded;
            }
            result = fetch => match result {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            },
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Metrics::dashboard_fetch_latency(result.is_ok(), elapsed_ms as f64);

        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        // Unlock together with publishing, so observers never see a result
        // while the lock still looks held.
        if inner.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            inner.in_flight = None;
        }
        if inner.session.as_ref() == Some(&address) {
            let outcome = self.commit(&mut inner, &address, result, now, seq, elapsed_ms);
            drop(inner);
            drop(flight);
            return outcome;
        }

        // Late response: the active address changed while this was in flight.
        let active = inner.session.clone();
        let reload = if inner.has_loaded_this_session {
            None
        } else {
            active.clone()
        };
        drop(inner);
        drop(flight);

        Metrics::dashboard_fetch("discarded");
        info!(
            address = %address.short(),
            active = ?active.as_ref().map(Address::short),
            seq,
            elapsed_ms,
            "Discarding late dashboard response"
        );

        // Loads for the new address were refused while this held the lock.
        if let Some(active) = reload {
            debug!(address = %active.short(), "Reloading active session");
            self.spawn_load(active, true);
        }
        LoadOutcome::Discarded
    }

    /// Apply a fetch result for the active session. Caller holds `inner`.
    fn commit(
        &self,
        inner: &mut FlightState,
        address: &Address,
        result: FetchResult<DashboardSnapshot>,
        now: u64,
        seq: u64,
        elapsed_ms: u64,
    ) -> LoadOutcome {
        match result {
            Ok(snapshot) => {
                if let Err(e) = self.cache.put(address, &snapshot) {
                    warn!(address = %address.short(), error = %e, "Failed to cache dashboard snapshot");
                }
                inner.has_loaded_this_session = true;
                inner.last_success_ms.insert(address.clone(), now);
                self.publish(address, Some(snapshot), DataSource::Fresh, None, now);
                Metrics::dashboard_fetch("success");
                info!(address = %address.short(), seq, elapsed_ms, "Dashboard loaded");
                LoadOutcome::Fetched
            }
            Err(e) => {
                warn!(
                    address = %address.short(),
                    seq,
                    elapsed_ms,
                    kind = e.label(),
                    error = %e,
                    "Dashboard fetch failed"
                );
                if let Some(stale) = self.cache.get_stale(address) {
                    Metrics::dashboard_fetch("stale_fallback");
                    info!(
                        address = %address.short(),
                        snapshot_age_secs = stale.age_secs(now),
                        "Serving stale dashboard after fetch failure"
                    );
                    self.publish(address, Some(stale), DataSource::StaleFallback, None, now);
                    LoadOutcome::FellBackToStale
                } else {
                    Metrics::dashboard_fetch("error");
                    let error = ErrorInfo::new(ErrorKind::FetchFailed, FETCH_FAILED_MESSAGE, now);
                    let id = error.id;
                    self.publish(address, None, DataSource::None, Some(error), now);
                    self.state
                        .expire_dashboard_error(id, self.config.fetch_error_display());
                    LoadOutcome::Failed
                }
            }
        }
    }

    fn publish(
        &self,
        address: &Address,
        snapshot: Option<DashboardSnapshot>,
        source: DataSource,
        error: Option<ErrorInfo>,
        now: u64,
    ) {
        let snapshot_is_fresh = snapshot
            .as_ref()
            .is_some_and(|s| s.is_fresh_within(now, self.config.snapshot_max_age_secs));
        self.state.update_dashboard_if(|v| {
            if v.address.as_ref() != Some(address) {
                return false;
            }
            v.snapshot = snapshot;
            v.source = source;
            v.snapshot_is_fresh = snapshot_is_fresh;
            v.loading = false;
            v.error = error;
            v.updated_at_ms = now;
            true
        });
    }

    fn release(&self, seq: u64) {
        let mut inner = self.inner.lock();
        if inner.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            inner.in_flight = None;
            // Covers aborted tasks that never published.
            self.state.update_dashboard_if(|v| std::mem::take(&mut v.loading));
        }
        drop(inner);
        self.released.notify_waiters();
    }
}

impl std::fmt::Debug for DashboardRequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardRequestCoordinator")
            .field("state", &self.snapshot_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, snapshot_for, wait_for_dashboard, Harness, BASE_TIME_MS};
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready_eq};

    #[tokio::test]
    async fn test_concurrent_loads_issue_single_fetch() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        h.fetcher.hold();

        let first = h.coordinator.spawn_load(a.clone(), false);
        assert!(first.is_fetching());
        assert_eq!(
            h.coordinator.spawn_load(a.clone(), false).outcome().await,
            LoadOutcome::Skipped(SkipReason::InFlight)
        );
        // Forced requests still respect the lock.
        assert_eq!(
            h.coordinator.spawn_load(a.clone(), true).outcome().await,
            LoadOutcome::Skipped(SkipReason::InFlight)
        );

        h.fetcher.release(1);
        assert_eq!(first.outcome().await, LoadOutcome::Fetched);
        assert_eq!(h.fetcher.call_count(), 1);
        assert!(!h.coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_inline_load_holds_lock_while_pending() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        h.fetcher.hold();

        let mut first = tokio_test::task::spawn(h.coordinator.load(a.clone(), false));
        assert_pending!(first.poll());
        assert!(h.coordinator.is_in_flight());
        assert_eq!(
            h.coordinator.load(a.clone(), true).await,
            LoadOutcome::Skipped(SkipReason::InFlight)
        );

        h.fetcher.release(1);
        assert!(first.is_woken());
        assert_ready_eq!(first.poll(), LoadOutcome::Fetched);
    }

    #[tokio::test]
    async fn test_second_load_after_completion_does_not_fetch() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());

        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Fetched);
        h.clock.advance(1);
        // The entry just written is fresh, so it is served without a fetch.
        assert_eq!(
            h.coordinator.load(a.clone(), false).await,
            LoadOutcome::ServedFromCache
        );

        // Without a cache entry the session flag still prevents a refetch.
        h.cache.invalidate(&a).unwrap();
        assert_eq!(
            h.coordinator.load(a.clone(), false).await,
            LoadOutcome::Skipped(SkipReason::AlreadyLoaded)
        );
        assert_eq!(h.fetcher.call_count(), 1);
        assert!(h.coordinator.snapshot_state().has_loaded_this_session);
    }

    #[tokio::test]
    async fn test_forced_load_bypasses_rate_limit_and_session_flag() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Fetched);

        h.clock.advance(10_000);
        assert_eq!(h.coordinator.load(a.clone(), true).await, LoadOutcome::Fetched);
        assert_eq!(h.fetcher.call_count(), 2);
        assert_eq!(
            h.coordinator.snapshot_state().last_successful_fetch_at_ms,
            Some(BASE_TIME_MS + 10_000)
        );
    }

    #[tokio::test]
    async fn test_rate_limit_survives_new_session() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Fetched);

        h.coordinator.end_session();
        h.coordinator.begin_session(a.clone());
        h.cache.invalidate(&a).unwrap();

        h.clock.advance(59_999);
        assert_eq!(
            h.coordinator.load(a.clone(), false).await,
            LoadOutcome::Skipped(SkipReason::RateLimited)
        );
        h.clock.advance(1);
        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Fetched);
    }

    #[tokio::test]
    async fn test_failure_with_stale_entry_publishes_stale() {
        let h = Harness::new();
        let a = addr(0xa1);
        let cached = snapshot_for(&a, 1_706_000_000);
        h.cache.put(&a, &cached).unwrap();
        let written_at = h.cache.entry(&a).unwrap().fetched_at_ms;
        h.clock.advance(h.config.cache_ttl_ms + 1);

        h.coordinator.begin_session(a.clone());
        h.fetcher.fail_all(true);
        assert_eq!(
            h.coordinator.load(a.clone(), false).await,
            LoadOutcome::FellBackToStale
        );

        let view = h.state.dashboard();
        assert_eq!(view.source, DataSource::StaleFallback);
        assert_eq!(view.snapshot, Some(cached));
        assert!(view.error.is_none());
        assert!(!view.loading);
        // Fallback does not refresh the entry's age.
        assert_eq!(h.cache.entry(&a).unwrap().fetched_at_ms, written_at);
        assert!(!h.coordinator.snapshot_state().has_loaded_this_session);
    }

    #[tokio::test]
    async fn test_failure_without_cache_publishes_error_that_expires() {
        let h = Harness::new();
        let b = addr(0xb2);
        h.coordinator.begin_session(b.clone());
        h.fetcher.fail_next(FetchError::Status {
            status: 500,
            body: String::new(),
        });

        assert_eq!(h.coordinator.load(b.clone(), false).await, LoadOutcome::Failed);
        let view = h.state.dashboard();
        assert!(view.snapshot.is_none());
        assert_eq!(view.source, DataSource::None);
        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::FetchFailed);
        assert_eq!(error.message, "Failed to load portfolio data");

        wait_for_dashboard(&h.state, |v| v.error.is_none()).await;
        // Nothing was cached for the failed address.
        assert!(h.cache.get_stale(&b).is_none());
    }

    #[tokio::test]
    async fn test_late_response_is_discarded_and_active_session_reloads() {
        let h = Harness::new();
        let a = addr(0xa1);
        let c = addr(0xc3);
        h.coordinator.begin_session(a.clone());
        h.fetcher.hold();
        let first = h.coordinator.spawn_load(a.clone(), false);

        // Account switch while A is in flight.
        h.coordinator.begin_session(c.clone());
        assert_eq!(
            h.coordinator.spawn_load(c.clone(), true).outcome().await,
            LoadOutcome::Skipped(SkipReason::InFlight)
        );

        h.fetcher.unhold();
        h.fetcher.release(1);
        assert_eq!(first.outcome().await, LoadOutcome::Discarded);
        assert!(h.cache.get_stale(&a).is_none());

        let view = wait_for_dashboard(&h.state, |v| v.source == DataSource::Fresh).await;
        assert_eq!(view.address, Some(c.clone()));
        assert_eq!(
            view.snapshot.unwrap().wallet_address,
            c.as_str().to_string()
        );
        assert_eq!(h.fetcher.calls(), vec![a, c]);
    }

    #[tokio::test]
    async fn test_load_for_inactive_address_is_skipped() {
        let h = Harness::new();
        assert_eq!(
            h.coordinator.load(addr(1), true).await,
            LoadOutcome::Skipped(SkipReason::InactiveAddress)
        );
        h.coordinator.begin_session(addr(2));
        assert_eq!(
            h.coordinator.load(addr(1), false).await,
            LoadOutcome::Skipped(SkipReason::InactiveAddress)
        );
        assert_eq!(h.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_switching_address_keeps_previous_cache_entry() {
        let h = Harness::new();
        let a = addr(0xa1);
        let c = addr(0xc3);
        h.coordinator.begin_session(a.clone());
        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Fetched);
        let before = h.cache.entry(&a).unwrap();

        h.coordinator.begin_session(c.clone());
        let state = h.coordinator.snapshot_state();
        assert!(!state.has_loaded_this_session);
        assert_eq!(state.session_address, Some(c.clone()));
        assert_eq!(h.state.dashboard().address, Some(c));
        assert_eq!(h.cache.entry(&a).unwrap(), before);
    }

    #[tokio::test]
    async fn test_fetch_timeout_counts_as_failure() {
        let h = Harness::with_config(SyncConfig {
            fetch_timeout_ms: 50,
            ..SyncConfig::default()
        });
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        h.fetcher.hold();

        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Failed);
        assert!(!h.coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_aborted_fetch_releases_lock() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        h.fetcher.hold();

        let LoadHandle::Fetching(task) = h.coordinator.spawn_load(a.clone(), false) else {
            panic!("expected a fetch");
        };
        assert!(h.state.dashboard().loading);
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(!h.coordinator.is_in_flight());
        assert!(!h.state.dashboard().loading);
        h.fetcher.unhold();
        assert_eq!(h.coordinator.load(a, false).await, LoadOutcome::Fetched);
    }

    #[tokio::test]
    async fn test_reset_all_clears_cache_and_bookkeeping() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        assert_eq!(h.coordinator.load(a.clone(), false).await, LoadOutcome::Fetched);

        assert_eq!(h.coordinator.reset_all().unwrap(), 1);
        assert!(h.cache.get_stale(&a).is_none());
        let state = h.coordinator.snapshot_state();
        assert_eq!(state.session_address, None);
        assert_eq!(state.last_attempt_at_ms, None);
        assert_eq!(h.state.dashboard(), DashboardView::default());

        // No rate limit carried over.
        h.coordinator.begin_session(a.clone());
        assert_eq!(h.coordinator.load(a, false).await, LoadOutcome::Fetched);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_fetch_and_refuses_new_sessions() {
        let h = Harness::new();
        let a = addr(0xa1);
        h.coordinator.begin_session(a.clone());
        h.fetcher.hold();

        let pending = h.coordinator.spawn_load(a.clone(), true);
        assert!(h.coordinator.is_in_flight());

        tokio::time::timeout(Duration::from_secs(1), h.coordinator.shutdown())
            .await
            .expect("shutdown waits only for the cancelled fetch");
        assert!(!h.coordinator.is_in_flight());
        assert_eq!(pending.outcome().await, LoadOutcome::Discarded);
        // Nothing from the cancelled fetch reached the cache.
        assert!(h.cache.get_stale(&a).is_none());

        // A late event from the old session cannot restart fetching.
        h.coordinator.begin_session(a.clone());
        assert_eq!(h.coordinator.session_address(), None);
        assert_eq!(
            h.coordinator.spawn_load(a, true).outcome().await,
            LoadOutcome::Skipped(SkipReason::InactiveAddress)
        );
        assert_eq!(h.fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_when_idle_returns_immediately() {
        let h = Harness::new();
        h.coordinator.begin_session(addr(0xa1));
        h.coordinator.shutdown().await;
        assert_eq!(h.coordinator.snapshot_state().session_address, None);
    }
}
