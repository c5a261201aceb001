//! Response cache (spec §4.7 `Close()` ordering names a `Cache` step; the
//! `cache`/`cache_stats` containers are named in spec §6's storage layout
//! but otherwise left to the implementer). A thin opaque-value cache over
//! `Store`, keyed by caller-chosen string keys (e.g. a tool-call content
//! hash), with hit/miss counters persisted alongside it.

use chrono::{DateTime, Utc};
use mcprox_core::Result;
use mcprox_store::{containers, Store};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const STATS_KEY: &str = "stats";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: Value,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn put(&self, key: &str, value: Value) -> Result<()>;
    fn invalidate(&self, key: &str) -> Result<()>;
    fn stats(&self) -> Result<CacheStats>;
    fn close(&self) -> Result<()>;
}

/// Default production cache: durable, process-restart-surviving, backed by
/// the same embedded store as everything else.
pub struct StoreCache {
    store: Store,
}

impl StoreCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn bump(&self, hit: bool) -> Result<()> {
        let mut stats: CacheStats = self
            .store
            .get(containers::CACHE_STATS, STATS_KEY)?
            .unwrap_or_default();
        if hit {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        self.store.put(containers::CACHE_STATS, STATS_KEY, &stats)
    }
}

impl Cache for StoreCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let entry: Option<CacheEntry> = self.store.get(containers::CACHE, key)?;
        self.bump(entry.is_some())?;
        Ok(entry.map(|e| e.value))
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.store.put(
            containers::CACHE,
            key,
            &CacheEntry {
                value,
                stored_at: Utc::now(),
            },
        )
    }

    fn invalidate(&self, key: &str) -> Result<()> {
        self.store.delete(containers::CACHE, key)
    }

    fn stats(&self) -> Result<CacheStats> {
        Ok(self
            .store
            .get(containers::CACHE_STATS, STATS_KEY)?
            .unwrap_or_default())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        Store::open(dir.path().join("db")).unwrap()
    }

    #[test]
    fn miss_then_hit_updates_stats() {
        let cache = StoreCache::new(store());
        assert!(cache.get("k").unwrap().is_none());
        cache.put("k", serde_json::json!({"v": 1})).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(serde_json::json!({"v": 1})));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = StoreCache::new(store());
        cache.put("k", serde_json::json!(1)).unwrap();
        cache.invalidate("k").unwrap();
        assert!(cache.get("k").unwrap().is_none());
    }
}
