//! Prometheus metrics for walletdash.
//!
//! Covers:
//! - Wallet connection state and provider events
//! - Dashboard load decisions, fetch outcomes and latency
//! - Cache lookups
//! - Session restarts and observer connections
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which must crash at startup rather than go unnoticed.
//! These panics can only happen during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, Gauge, HistogramVec, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Wallet connection state (1 = connected, 0 = disconnected).
pub static WALLET_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "walletdash_wallet_connected",
        "Wallet connection state (1=connected)"
    )
    .unwrap()
});

/// Connect attempts by outcome.
/// Labels: outcome (connected/wallet_unavailable/user_rejected/request_already_pending/provider_error)
pub static CONNECT_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "walletdash_connect_attempts_total",
        "Total wallet connect attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Provider push events.
/// Labels: kind (accounts_changed/chain_changed), handling (applied/ignored)
pub static PROVIDER_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "walletdash_provider_events_total",
        "Total wallet provider events received",
        &["kind", "handling"]
    )
    .unwrap()
});

/// Coordinator load decisions.
/// Labels: decision (cache/fetch/in_flight/rate_limited/already_loaded/inactive_address)
pub static LOAD_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "walletdash_load_decisions_total",
        "Total dashboard load decisions by result",
        &["decision"]
    )
    .unwrap()
});

/// Dashboard fetch outcomes.
/// Labels: outcome (success/stale_fallback/error/discarded)
pub static DASHBOARD_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "walletdash_dashboard_fetch_total",
        "Total dashboard fetches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Dashboard fetch latency in milliseconds.
pub static DASHBOARD_FETCH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "walletdash_dashboard_fetch_latency_ms",
        "Dashboard endpoint round trip in milliseconds",
        &["result"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap()
});

/// Cache lookups.
/// Labels: result (hit/miss/expired/corrupt)
pub static CACHE_LOOKUPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "walletdash_cache_lookups_total",
        "Total dashboard cache lookups by result",
        &["result"]
    )
    .unwrap()
});

/// Session restarts.
/// Labels: reason (chain_changed/forced_disconnect)
pub static SESSION_RESTARTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "walletdash_session_restarts_total",
        "Total session restarts by reason",
        &["reason"]
    )
    .unwrap()
});

/// Connected observer WebSocket clients.
pub static OBSERVER_CLIENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "walletdash_observer_clients",
        "Connected observer WebSocket clients"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn wallet_connected() {
        WALLET_CONNECTED.set(1.0);
    }

    pub fn wallet_disconnected() {
        WALLET_CONNECTED.set(0.0);
    }

    /// Record the terminal outcome of a connect attempt.
    pub fn connect_attempt(outcome: &str) {
        CONNECT_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a provider event and whether it changed anything.
    pub fn provider_event(kind: &str, applied: bool) {
        let handling = if applied { "applied" } else { "ignored" };
        PROVIDER_EVENTS_TOTAL
            .with_label_values(&[kind, handling])
            .inc();
    }

    pub fn load_decision(decision: &str) {
        LOAD_DECISIONS_TOTAL.with_label_values(&[decision]).inc();
    }

    pub fn dashboard_fetch(outcome: &str) {
        DASHBOARD_FETCH_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record fetch round trip. `ok` is the transport result, before any
    /// fallback or discard.
    pub fn dashboard_fetch_latency(ok: bool, latency_ms: f64) {
        let result = if ok { "ok" } else { "err" };
        DASHBOARD_FETCH_LATENCY_MS
            .with_label_values(&[result])
            .observe(latency_ms);
    }

    pub fn cache_lookup(result: &str) {
        CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn session_restart(reason: &str) {
        SESSION_RESTARTS_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn observer_connected() {
        OBSERVER_CLIENTS.inc();
    }

    pub fn observer_disconnected() {
        OBSERVER_CLIENTS.dec();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
