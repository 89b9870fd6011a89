//! Dashboard snapshot document.
//!
//! The snapshot is produced by the dashboard backend and is treated as opaque
//! except for `timestamp`. The typed fields below cover the blocks the
//! backend is known to emit; anything else is preserved in `extra` so a cache
//! round trip never drops data.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum age of a snapshot's own `timestamp` before it is considered stale.
pub const SNAPSHOT_MAX_AGE_SECS: u64 = 300;

/// Full dashboard document for one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Generation time (Unix seconds).
    pub timestamp: i64,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub portfolio: Portfolio,
    #[serde(default)]
    pub market_data: MarketData,
    #[serde(default)]
    pub sentiment: Value,
    #[serde(default)]
    pub correlations: Value,
    #[serde(default)]
    pub ai_insights: Value,
    #[serde(default)]
    pub system_status: Value,
    /// Top-level failure reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unrecognized top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wallet holdings block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub total_balance_eth: Option<Decimal>,
    #[serde(default)]
    pub total_balance_usd: Option<Decimal>,
    #[serde(default)]
    pub eth_price: Option<Decimal>,
    #[serde(default)]
    pub transaction_count: u64,
    #[serde(default)]
    pub recent_transactions: Vec<TransactionSummary>,
    #[serde(default)]
    pub assets: Vec<Holding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of the recent transactions list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: String,
    #[serde(default)]
    pub value_eth: Option<Decimal>,
    #[serde(default)]
    pub value_usd: Option<Decimal>,
}

/// Token holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub value_usd: Option<Decimal>,
}

/// Market block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    /// Current USD price by upper-case symbol.
    #[serde(default)]
    pub current_prices: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub detailed_analysis: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DashboardSnapshot {
    /// Age of the document in seconds at `now_ms` (0 if stamped in the future).
    pub fn age_secs(&self, now_ms: u64) -> u64 {
        let now_secs = (now_ms / 1000) as i64;
        now_secs.saturating_sub(self.timestamp).max(0) as u64
    }

    /// Freshness signal derived from the document itself, independent of any
    /// cache TTL.
    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        self.is_fresh_within(now_ms, SNAPSHOT_MAX_AGE_SECS)
    }

    /// Same as [`is_fresh_at`](Self::is_fresh_at) with a custom age limit.
    pub fn is_fresh_within(&self, now_ms: u64, max_age_secs: u64) -> bool {
        self.age_secs(now_ms) < max_age_secs
    }

    /// Whether the backend reported a whole-document failure.
    pub fn is_backend_error(&self) -> bool {
        self.error.is_some() && self.portfolio == Portfolio::default()
    }

    pub fn total_balance_usd(&self) -> Option<Decimal> {
        self.portfolio.total_balance_usd
    }

    pub fn price_of(&self, symbol: &str) -> Option<Decimal> {
        self.market_data
            .current_prices
            .get(&symbol.to_ascii_uppercase())
            .copied()
    }
}
