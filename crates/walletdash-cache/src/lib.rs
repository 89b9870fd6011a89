//! Durable dashboard snapshot cache.
//!
//! Snapshots are persisted per wallet address through a [`KvStore`] so they
//! survive process restarts. Reads never fail: an unreadable or corrupt
//! entry is a cache miss.

pub mod cache;
pub mod error;
pub mod store;

pub use cache::{DashboardCacheEntry, DashboardDataCache, DEFAULT_CACHE_TTL_MS};
pub use error::{CacheError, CacheResult};
pub use store::{FileStore, KvStore, MemoryStore};
