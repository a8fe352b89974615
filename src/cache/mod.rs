//! In-memory expiring key/value store.
//!
//! [`CacheStore`] is an owned object (callers share it through an `Arc`)
//! holding a `HashMap` behind a `std::sync::RwLock`. Expiry is lazy: a read
//! of an expired entry reports a miss but leaves the entry in place. Expired
//! entries are reclaimed by [`CacheStore::purge_expired`], which the
//! optional sweeper task started by [`CacheStore::spawn_sweeper`] calls on
//! an interval.
//!
//! The store is generic over its value type so readers get the concrete
//! type back without downcasting. The search engine uses
//! [`ResponseCache`].
//!
//! Unlike the breakers and the in-memory index, which use `parking_lot`,
//! the map sits behind `std::sync::RwLock`: a writer that panicked leaves
//! the lock poisoned, and every later operation reports
//! [`CacheError::Poisoned`] instead of serving a half-written map. The
//! engine logs that error and treats it as a miss.

pub mod policy;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::models::SearchResponse;

pub use policy::{CacheKey, CachePolicy};

/// Cache of search responses keyed by [`CacheKey`].
pub type ResponseCache = CacheStore<SearchResponse>;

/// A cached value and the instant it stops being served.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Expiring key/value store.
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite `key`, valid for `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.clear();
        Ok(())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> Result<usize, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.expires_at.saturating_duration_since(Instant::now())))
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        Ok(before - entries.len())
    }
}

impl<V: Clone> CacheStore<V> {
    /// Fetch a live entry. Expired entries read as a miss.
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value.clone()))
    }
}

impl<V: Send + Sync + 'static> CacheStore<V> {
    /// Start a background task that purges expired entries every `every`.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                match cache.purge_expired() {
                    Ok(0) => {}
                    Ok(n) => debug!(removed = n, "cache sweep"),
                    Err(e) => warn!("cache sweep failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let cache: CacheStore<String> = CacheStore::new();
        cache.set("a", "one".to_string(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("one"));
        assert_eq!(cache.get("missing").unwrap(), None);

        cache.delete("a").unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }

    #[test]
    fn test_overwrite_last_write_wins() {
        let cache: CacheStore<u32> = CacheStore::new();
        cache.set("k", 1, Duration::from_secs(60)).unwrap();
        cache.set("k", 2, Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(2));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss_but_stays_until_purged() {
        let cache: CacheStore<u32> = CacheStore::new();
        cache.set("k", 1, Duration::from_millis(10)).unwrap();
        cache.set("live", 2, Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.get("k").unwrap(), None);
        assert_eq!(cache.len().unwrap(), 2);

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get("live").unwrap(), Some(2));
    }

    #[test]
    fn test_clear() {
        let cache: CacheStore<u32> = CacheStore::new();
        cache.set("a", 1, Duration::from_secs(60)).unwrap();
        cache.set("b", 2, Duration::from_secs(60)).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_ttl_remaining() {
        let cache: CacheStore<u32> = CacheStore::new();
        cache.set("k", 1, Duration::from_secs(120)).unwrap();
        let remaining = cache.ttl_remaining("k").unwrap().unwrap();
        assert!(remaining > Duration::from_secs(110));
        assert!(remaining <= Duration::from_secs(120));
        assert_eq!(cache.ttl_remaining("nope").unwrap(), None);
    }

    #[test]
    fn test_poisoned_lock_reports_cache_error() {
        let cache: Arc<CacheStore<u32>> = Arc::new(CacheStore::new());
        let writer = cache.clone();
        let _ = std::thread::spawn(move || {
            let _guard = writer.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(cache.get("k"), Err(CacheError::Poisoned)));
        assert!(matches!(
            cache.set("k", 1, Duration::from_secs(1)),
            Err(CacheError::Poisoned)
        ));
        assert!(matches!(cache.clear(), Err(CacheError::Poisoned)));
    }

    #[tokio::test]
    async fn test_sweeper_reclaims_expired_entries() {
        let cache: Arc<CacheStore<u32>> = Arc::new(CacheStore::new());
        cache.set("short", 1, Duration::from_millis(5)).unwrap();
        let handle = cache.spawn_sweeper(Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.len().unwrap(), 0);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit after the cache is dropped")
            .unwrap();
    }
}
