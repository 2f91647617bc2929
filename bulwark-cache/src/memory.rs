//! In-memory cache store.
//!
//! Dashmap-backed implementation of [`CacheStore`] with lazy expiry on
//! access, a periodic background sweep, negative caching and single-flight
//! de-duplication of concurrent fetches. Single-process only: the
//! single-flight guarantee does not extend across processes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bulwark_core::{BulwarkResult, CacheEntryOptions, MemoryCacheConfig};
use dashmap::DashMap;
use futures_util::FutureExt;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::entry::{CacheEntry, CachedPayload};
use crate::single_flight::{Flight, FlightGroup};
use crate::store::{CacheLookup, CacheStats, CacheStore, CacheValue};

#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    negative_hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

struct StoreInner {
    entries: DashMap<String, CacheEntry>,
    flights: FlightGroup,
    stats: StatsCounters,
    config: MemoryCacheConfig,
}

impl StoreInner {
    /// Return the live payload for `key`, refreshing its sliding window.
    /// Expired entries are removed on the spot.
    fn live_payload(&self, key: &str) -> Option<CachedPayload> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.touch(now);
                return Some(entry.payload().clone());
            }
        } else {
            return None;
        }

        if self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some() {
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    fn insert_payload(&self, key: &str, payload: CachedPayload, options: &CacheEntryOptions) {
        let entry = CacheEntry::new(payload, options, Instant::now());
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove all expired entries; returns the number swept.
    fn sweep(&self, now: Instant) -> u64 {
        let mut swept = 0u64;
        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                swept += 1;
                false
            } else {
                true
            }
        });
        if swept > 0 {
            self.stats.expirations.fetch_add(swept, Ordering::Relaxed);
            debug!(swept, remaining = self.entries.len(), "Cache sweep removed expired entries");
        }
        swept
    }
}

/// Retires the leader's flight when the leading call finishes or is
/// dropped mid-flight, so an abandoned fetch never occupies its key.
/// Waiters still holding the shared future drive it to completion; a
/// fresh caller after retirement leads a new flight.
struct FlightGuard<'a> {
    flights: &'a FlightGroup,
    key: &'a str,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flights.complete(self.key, &self.flight);
    }
}

/// In-memory [`CacheStore`] implementation.
///
/// Cheap to clone; clones share the same entries, statistics and
/// in-flight fetches.
#[derive(Clone)]
pub struct MemoryCacheStore {
    inner: Arc<StoreInner>,
}

impl MemoryCacheStore {
    /// Create a store with the given configuration.
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                flights: FlightGroup::new(),
                stats: StatsCounters::default(),
                config,
            }),
        }
    }

    /// Create a store with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MemoryCacheConfig::default())
    }

    /// Spawn the periodic background sweep of expired entries.
    ///
    /// The task holds only a weak reference and ends on its own once the
    /// store is dropped. Lazy expiry on access keeps reads correct even
    /// without the sweeper; the sweep reclaims memory for keys that are
    /// never read again.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let sweep_interval = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.sweep(Instant::now());
            }
        })
    }

    /// Store configuration.
    pub fn config(&self) -> &MemoryCacheConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for MemoryCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheStore")
            .field("entry_count", &self.inner.entries.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get<V: CacheValue>(&self, key: &str) -> BulwarkResult<CacheLookup<V>> {
        match self.inner.live_payload(key) {
            Some(CachedPayload::Absent) => {
                self.inner.stats.negative_hits.fetch_add(1, Ordering::Relaxed);
                Ok(CacheLookup::NegativeHit)
            }
            Some(payload) => {
                self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
                match payload.decode::<V>()? {
                    Some(value) => Ok(CacheLookup::Hit(value)),
                    // Unreachable for non-Absent payloads; treat as miss.
                    None => Ok(CacheLookup::Miss),
                }
            }
            None => {
                self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(CacheLookup::Miss)
            }
        }
    }

    async fn get_or_create<V, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        factory: F,
    ) -> BulwarkResult<Option<V>>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BulwarkResult<Option<V>>> + Send + 'static,
    {
        if let Some(payload) = self.inner.live_payload(key) {
            if payload.is_absent() {
                self.inner.stats.negative_hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
            }
            return payload.decode::<V>();
        }
        self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);

        let (flight, led) = self.inner.flights.join_or_lead(key, || {
            let inner = Arc::clone(&self.inner);
            let key = key.to_string();
            let options = options.clone();
            async move {
                // A previous flight may have populated the entry between
                // this caller's miss and the flight starting.
                if let Some(payload) = inner.live_payload(&key) {
                    return Ok(payload);
                }

                let outcome = match factory().await {
                    Ok(Some(value)) => CachedPayload::from_value(&value),
                    Ok(None) => Ok(CachedPayload::Absent),
                    Err(error) => Err(error),
                };
                // Factory errors are NOT cached: the next caller retries.
                if let Ok(payload) = &outcome {
                    inner.insert_payload(&key, payload.clone(), &options);
                }
                outcome
            }
            .boxed()
        });

        // The leading caller retires the flight on every exit path,
        // including being dropped mid-flight.
        let _guard = led.then(|| FlightGuard {
            flights: &self.inner.flights,
            key,
            flight: flight.clone(),
        });
        if !led {
            debug!(key, "Joining in-flight fetch");
        }
        let payload = flight.await?;
        payload.decode::<V>()
    }

    async fn set<V: CacheValue>(
        &self,
        key: &str,
        value: &V,
        options: &CacheEntryOptions,
    ) -> BulwarkResult<()> {
        let payload = CachedPayload::from_value(value)?;
        self.inner.insert_payload(key, payload, options);
        Ok(())
    }

    async fn set_negative(&self, key: &str, options: &CacheEntryOptions) -> BulwarkResult<()> {
        self.inner.insert_payload(key, CachedPayload::Absent, options);
        Ok(())
    }

    async fn remove(&self, key: &str) -> BulwarkResult<()> {
        self.inner.entries.remove(key);
        Ok(())
    }

    async fn remove_by_prefix(&self, prefix: &str) -> BulwarkResult<u64> {
        let mut removed = 0u64;
        self.inner.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(prefix, removed, "Bulk invalidation by prefix");
        }
        Ok(removed)
    }

    async fn stats(&self) -> BulwarkResult<CacheStats> {
        let stats = &self.inner.stats;
        Ok(CacheStats {
            hits: stats.hits.load(Ordering::Relaxed),
            negative_hits: stats.negative_hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            entry_count: self.inner.entries.len() as u64,
            expirations: stats.expirations.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::BulwarkError;
    use futures_util::future::join_all;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::time::{advance, sleep};

    fn store() -> MemoryCacheStore {
        MemoryCacheStore::with_defaults()
    }

    fn options(sliding: Option<u64>, absolute: Option<u64>) -> CacheEntryOptions {
        CacheEntryOptions {
            sliding_expiration: sliding.map(Duration::from_secs),
            absolute_expiration: absolute.map(Duration::from_secs),
            negative_expiration: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_roundtrip() {
        let cache = store();
        cache.set("item:1", &"Widget".to_string(), &options(None, Some(600))).await.unwrap();

        let lookup: CacheLookup<String> = cache.get("item:1").await.unwrap();
        assert_eq!(lookup, CacheLookup::Hit("Widget".to_string()));

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_missing_key_is_a_miss_not_an_error() {
        let cache = store();
        let lookup: CacheLookup<String> = cache.get("absent").await.unwrap();
        assert_eq!(lookup, CacheLookup::Miss);
        assert_eq!(cache.stats().await.unwrap().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_expiry_boundary() {
        let cache = store();
        cache.set("k", &1u32, &options(None, Some(10))).await.unwrap();

        advance(Duration::from_secs(10)).await;
        let at_deadline: CacheLookup<u32> = cache.get("k").await.unwrap();
        assert_eq!(at_deadline, CacheLookup::Hit(1));

        advance(Duration::from_millis(1)).await;
        let past_deadline: CacheLookup<u32> = cache.get("k").await.unwrap();
        assert_eq!(past_deadline, CacheLookup::Miss);
        assert_eq!(cache.stats().await.unwrap().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiry_refreshed_by_access() {
        let cache = store();
        cache.set("k", &1u32, &options(Some(5), None)).await.unwrap();

        // Keep touching within the sliding window.
        for _ in 0..3 {
            advance(Duration::from_secs(4)).await;
            let lookup: CacheLookup<u32> = cache.get("k").await.unwrap();
            assert!(lookup.is_hit());
        }

        // Left untouched past the window, the entry expires.
        advance(Duration::from_secs(6)).await;
        let lookup: CacheLookup<u32> = cache.get("k").await.unwrap();
        assert_eq!(lookup, CacheLookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_marker_expires_after_negative_ttl() {
        let cache = store();
        cache.set_negative("item:404", &options(Some(300), Some(600))).await.unwrap();

        let lookup: CacheLookup<String> = cache.get("item:404").await.unwrap();
        assert_eq!(lookup, CacheLookup::NegativeHit);

        advance(Duration::from_secs(31)).await;
        let lookup: CacheLookup<String> = cache.get("item:404").await.unwrap();
        assert_eq!(lookup, CacheLookup::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_populates_on_miss_only() {
        let cache = store();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_create("item:42", &options(Some(300), Some(600)), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some("Widget".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(value, Some("Widget".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_invokes_factory_exactly_once() {
        let cache = store();
        let calls = Arc::new(AtomicU32::new(0));

        let fetches = (0..8).map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .get_or_create("item:42", &options(Some(300), Some(600)), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        Ok(Some(42u64))
                    })
                    .await
            }
        });

        let results = join_all(fetches).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), Some(42));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_error_reaches_all_waiters_and_is_not_cached() {
        let cache = store();
        let calls = Arc::new(AtomicU32::new(0));

        let fetches = (0..4).map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .get_or_create::<u64, _, _>(
                        "item:42",
                        &options(Some(300), Some(600)),
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            sleep(Duration::from_millis(10)).await;
                            Err(BulwarkError::upstream("db down"))
                        },
                    )
                    .await
            }
        });

        for result in join_all(fetches).await {
            assert_eq!(result, Err(BulwarkError::upstream("db down")));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().await.unwrap().entry_count, 0);

        // The failure was not cached: the next call retries the factory.
        let calls2 = Arc::clone(&calls);
        let value = cache
            .get_or_create("item:42", &options(Some(300), Some(600)), move || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(Some(7u64))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_does_not_occupy_the_key() {
        let cache = store();
        let calls = Arc::new(AtomicU32::new(0));

        // The leading caller is polled once (starting the fetch) and then
        // dropped before the factory resolves.
        let calls1 = Arc::clone(&calls);
        let abandoned_options = options(Some(300), Some(600));
        let abandoned = cache.get_or_create(
            "item:42",
            &abandoned_options,
            move || async move {
                calls1.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(3600)).await;
                Ok(Some(1u64))
            },
        );
        assert!(tokio::time::timeout(Duration::ZERO, abandoned).await.is_err());

        // The key is free again: a fresh caller leads a new flight.
        let calls2 = Arc::clone(&calls);
        let value = cache
            .get_or_create("item:42", &options(Some(300), Some(600)), move || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(Some(2u64))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_caches_negative_result() {
        let cache = store();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let value: Option<String> = cache
                .get_or_create("item:404", &options(Some(300), Some(600)), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert_eq!(value, None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "negative result served from cache");

        // Past the negative TTL the factory is consulted again.
        advance(Duration::from_secs(31)).await;
        let calls2 = Arc::clone(&calls);
        let value: Option<String> = cache
            .get_or_create("item:404", &options(Some(300), Some(600)), move || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(Some("restocked".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(value, Some("restocked".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_remove_by_prefix() {
        let cache = store();
        let opts = options(None, Some(600));
        cache.set("item:1", &1u32, &opts).await.unwrap();
        cache.set("item:2", &2u32, &opts).await.unwrap();
        cache.set("item:owner:alice", &vec![1u32], &opts).await.unwrap();
        cache.set("user:1", &9u32, &opts).await.unwrap();

        cache.remove("item:2").await.unwrap();
        assert_eq!(cache.get::<u32>("item:2").await.unwrap(), CacheLookup::Miss);

        let removed = cache.remove_by_prefix("item:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.get::<u32>("user:1").await.unwrap(), CacheLookup::Hit(9));

        // Removing a missing key is not an error.
        cache.remove("item:2").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_removes_expired_entries() {
        let cache = MemoryCacheStore::new(
            MemoryCacheConfig::new().with_sweep_interval(Duration::from_secs(1)),
        );
        cache.set("short", &1u32, &options(None, Some(2))).await.unwrap();
        cache.set("long", &2u32, &options(None, Some(600))).await.unwrap();

        let sweeper = cache.spawn_sweeper();
        advance(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.expirations, 1);

        sweeper.abort();
    }
}
