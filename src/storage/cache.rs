use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
    }
}

/// Cached payload for one domain
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of a cache fill
pub enum CacheFill<V> {
    /// Cache the value under the TTL
    Store(V),
    /// Hand the value back without caching it (a degraded result)
    Transient(V),
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_hours: i64,
}

/// Per-domain TTL cache.
///
/// Each key owns an async mutex, so concurrent lookups for the same domain
/// wait on a single fill while other domains proceed independently.
pub struct TtlCache<V> {
    name: &'static str,
    entries: DashMap<String, Arc<Mutex<Option<CacheEntry<V>>>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        self.clock.now() - entry.fetched_at < self.ttl
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Option<CacheEntry<V>>>> {
        // Clone the Arc out so no shard lock is held across an await
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .value()
            .clone()
    }

    /// Return the fresh cached value for `key`, or run `fetch` and cache its result
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheFill<V>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if self.is_fresh(entry) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("{} cache hit for {}", self.name, key);
                return entry.value.clone();
            }
            debug!("{} cache entry for {} expired", self.name, key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.prune_expired();
        match fetch().await {
            CacheFill::Store(value) => {
                *guard = Some(CacheEntry {
                    key: key.to_string(),
                    value: value.clone(),
                    fetched_at: self.clock.now(),
                });
                value
            }
            CacheFill::Transient(value) => {
                *guard = None;
                value
            }
        }
    }

    /// Fresh entry for `key`, if any
    pub async fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        let slot = self.entries.get(key).map(|slot| slot.value().clone())?;
        let guard = slot.lock().await;
        guard.as_ref().filter(|entry| self.is_fresh(entry)).cloned()
    }

    /// Drop slots that hold no fresh entry and that no lookup is using.
    /// Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let before = self.entries.len();
        // A slot handed out by `slot()` has a second strong reference until its lookup ends
        self.entries.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => guard.as_ref().is_some_and(|entry| self.is_fresh(entry)),
                Err(_) => true,
            }
        });
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("{} cache pruned {} stale slot(s)", self.name, removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        debug!("{} cache cleared", self.name);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.to_string(),
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_hours: self.ttl.num_hours(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn cache_with_clock() -> (TtlCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::new("test", Duration::hours(24), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let (cache, _clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("example.com", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    CacheFill::Store("v".to_string())
                })
                .await;
            assert_eq!(value, "v");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let (cache, clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            CacheFill::Store(format!("v{}", n))
        };

        assert_eq!(cache.get_or_fetch("a", fetch).await, "v0");
        clock.advance(Duration::hours(23));
        assert_eq!(cache.get_or_fetch("a", fetch).await, "v0");
        clock.advance(Duration::hours(1));
        assert_eq!(cache.get_or_fetch("a", fetch).await, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transient_results_are_not_cached() {
        let (cache, _clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            CacheFill::Transient("degraded".to_string())
        };

        cache.get_or_fetch("a", fetch).await;
        cache.get_or_fetch("a", fetch).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.peek("a").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fill() {
        let (cache, _clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            CacheFill::Store("v".to_string())
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("same", fetch),
            cache.get_or_fetch("same", fetch),
            cache.get_or_fetch("same", fetch)
        );
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("v", "v", "v"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_slots_are_pruned_on_the_next_miss() {
        let (cache, clock) = cache_with_clock();
        let store = |v: &'static str| move || async move { CacheFill::Store(v.to_string()) };

        cache.get_or_fetch("a.example", store("a")).await;
        cache.get_or_fetch("b.example", store("b")).await;
        cache
            .get_or_fetch("down.example", || async move { CacheFill::Transient("degraded".to_string()) })
            .await;
        clock.advance(Duration::hours(12));
        cache.get_or_fetch("c.example", store("c")).await;
        assert_eq!(cache.stats().entries, 3);

        clock.advance(Duration::hours(13));
        cache.get_or_fetch("d.example", store("d")).await;

        assert_eq!(cache.stats().entries, 2);
        assert!(cache.peek("a.example").await.is_none());
        assert_eq!(cache.peek("c.example").await.unwrap().value, "c");
        assert_eq!(cache.peek("d.example").await.unwrap().value, "d");
        assert_eq!(cache.prune_expired(), 0);

        clock.advance(Duration::hours(24));
        assert_eq!(cache.prune_expired(), 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let (cache, _clock) = cache_with_clock();
        cache
            .get_or_fetch("a", || async move { CacheFill::Store("v".to_string()) })
            .await;
        assert!(cache.peek("a").await.is_some());
        cache.clear();
        assert!(cache.peek("a").await.is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
