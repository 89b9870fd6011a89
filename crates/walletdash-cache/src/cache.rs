//! Dashboard snapshot cache.
//!
//! One entry per wallet address, stored under `dashboard_cache_<address>`.
//! Freshness (`now - fetched_at < ttl`) gates only [`DashboardDataCache::get`];
//! [`DashboardDataCache::get_stale`] ignores it and exists for fetch-failure
//! fallback.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walletdash_core::{Address, Clock, DashboardSnapshot};
use walletdash_telemetry::Metrics;

use crate::error::{CacheError, CacheResult};
use crate::store::KvStore;

/// Default time-to-live of a cache entry (5 minutes).
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

const KEY_PREFIX: &str = "dashboard_cache_";

/// Persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardCacheEntry {
    pub address: Address,
    pub snapshot: DashboardSnapshot,
    #[serde(rename = "fetched_at_epoch_ms")]
    pub fetched_at_ms: u64,
    pub ttl_ms: u64,
}

impl DashboardCacheEntry {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.fetched_at_ms)
    }

    pub fn is_fresh_at(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) < self.ttl_ms
    }
}

/// Borrowed view used for writes, avoiding a snapshot clone.
#[derive(Serialize)]
struct EntryRef<'a> {
    address: &'a Address,
    snapshot: &'a DashboardSnapshot,
    fetched_at_epoch_ms: u64,
    ttl_ms: u64,
}

/// Address-partitioned, TTL-based snapshot cache.
pub struct DashboardDataCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl DashboardDataCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            store,
            clock,
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    fn key(address: &Address) -> String {
        format!("{KEY_PREFIX}{address}")
    }

    /// Load and validate the raw entry for `address`.
    fn load_entry(&self, address: &Address) -> CacheResult<Option<DashboardCacheEntry>> {
        let Some(raw) = self.store.get(&Self::key(address))? else {
            return Ok(None);
        };
        let entry: DashboardCacheEntry =
            serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if entry.address != *address {
            return Err(CacheError::Corrupt(format!(
                "entry keyed for {address} belongs to {}",
                entry.address
            )));
        }
        Ok(Some(entry))
    }

    /// Entry for `address` regardless of freshness. Unreadable entries are a
    /// miss and are dropped from storage.
    pub fn entry(&self, address: &Address) -> Option<DashboardCacheEntry> {
        match self.load_entry(address) {
            Ok(entry) => entry,
            Err(e) => {
                Metrics::cache_lookup("corrupt");
                warn!(address = %address.short(), error = %e, "Discarding unreadable cache entry");
                if let Err(e) = self.store.remove(&Self::key(address)) {
                    debug!(error = %e, "Failed to remove unreadable cache entry");
                }
                None
            }
        }
    }

    /// Cached snapshot, only if still fresh.
    pub fn get(&self, address: &Address) -> Option<DashboardSnapshot> {
        let Some(entry) = self.entry(address) else {
            Metrics::cache_lookup("miss");
            return None;
        };

        let now_ms = self.clock.now_ms();
        if entry.is_fresh_at(now_ms) {
            Metrics::cache_lookup("hit");
            debug!(
                address = %address.short(),
                age_ms = entry.age_ms(now_ms),
                "Cache hit"
            );
            Some(entry.snapshot)
        } else {
            Metrics::cache_lookup("expired");
            debug!(
                address = %address.short(),
                age_ms = entry.age_ms(now_ms),
                ttl_ms = entry.ttl_ms,
                "Cache entry expired"
            );
            None
        }
    }

    /// Cached snapshot regardless of age. Fallback path only.
    pub fn get_stale(&self, address: &Address) -> Option<DashboardSnapshot> {
        self.entry(address).map(|entry| entry.snapshot)
    }

    /// Store `snapshot` for `address`, stamped with the current time.
    pub fn put(&self, address: &Address, snapshot: &DashboardSnapshot) -> CacheResult<()> {
        let entry = EntryRef {
            address,
            snapshot,
            fetched_at_epoch_ms: self.clock.now_ms(),
            ttl_ms: self.ttl_ms,
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.put(&Self::key(address), &raw)?;
        debug!(address = %address.short(), bytes = raw.len(), "Cached dashboard snapshot");
        Ok(())
    }

    /// Remove the entry for `address`.
    pub fn invalidate(&self, address: &Address) -> CacheResult<()> {
        self.store.remove(&Self::key(address))
    }

    /// Remove every dashboard entry. Returns the number removed.
    pub fn invalidate_all(&self) -> CacheResult<usize> {
        let keys = self.store.keys(KEY_PREFIX)?;
        for key in &keys {
            self.store.remove(key)?;
        }
        info!(removed = keys.len(), "Invalidated all dashboard cache entries");
        Ok(keys.len())
    }
}

impl std::fmt::Debug for DashboardDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardDataCache")
            .field("ttl_ms", &self.ttl_ms)
            .finish()
    }
}
