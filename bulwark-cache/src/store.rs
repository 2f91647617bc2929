//! Cache store trait and read outcomes.
//!
//! The trait abstracts over interchangeable backends. The in-process
//! [`MemoryCacheStore`](crate::MemoryCacheStore) guarantees single-flight
//! de-duplication of concurrent `get_or_create` calls; a remote or
//! distributed implementation keeps this same contract but trades the
//! within-process single-flight guarantee for eventual convergence across
//! processes. That distinction is part of the contract, not hidden.

use std::future::Future;

use async_trait::async_trait;
use bulwark_core::{BulwarkResult, CacheEntryOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Marker trait for values that can live in the cache.
///
/// Values cross the store boundary serialized, so any backend (in-memory
/// or remote) honors the same contract.
pub trait CacheValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Outcome of a plain cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<V> {
    /// A live entry was found.
    Hit(V),
    /// A live negative marker was found: the upstream is known to have no
    /// result for this key.
    NegativeHit,
    /// Nothing cached for this key.
    Miss,
}

impl<V> CacheLookup<V> {
    /// Convert to `Some(value)` on a hit, `None` otherwise.
    pub fn into_option(self) -> Option<V> {
        match self {
            Self::Hit(value) => Some(value),
            Self::NegativeHit | Self::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }
}

/// Abstract key/value store with per-entry expiration.
///
/// `get`/`set`/`remove` never fail for missing keys; the only errors a
/// backend raises on those paths are its own faults (e.g. payload
/// serialization). `get_or_create` additionally propagates the factory's
/// error, uncached, to every caller waiting on the same key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a key.
    async fn get<V: CacheValue>(&self, key: &str) -> BulwarkResult<CacheLookup<V>>;

    /// Read a key, invoking `factory` on a miss.
    ///
    /// Concurrent callers for the same key await the same in-progress
    /// factory invocation (single-flight). The factory resolving to
    /// `Ok(None)` stores a negative marker for
    /// `options.negative_expiration`; `Ok(Some(v))` stores the value per
    /// the sliding/absolute options. A factory error is returned to all
    /// waiters and nothing is cached, so the next call retries.
    async fn get_or_create<V, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        factory: F,
    ) -> BulwarkResult<Option<V>>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BulwarkResult<Option<V>>> + Send + 'static;

    /// Store a value.
    async fn set<V: CacheValue>(
        &self,
        key: &str,
        value: &V,
        options: &CacheEntryOptions,
    ) -> BulwarkResult<()>;

    /// Store a short-lived "not found" marker.
    async fn set_negative(&self, key: &str, options: &CacheEntryOptions) -> BulwarkResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> BulwarkResult<()>;

    /// Remove every key starting with `prefix`; returns the number
    /// removed. Used for bulk invalidation of per-owner or per-entity
    /// key families.
    async fn remove_by_prefix(&self, prefix: &str) -> BulwarkResult<u64>;

    /// Usage statistics.
    async fn stats(&self) -> BulwarkResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered by a live value entry.
    pub hits: u64,
    /// Reads answered by a live negative marker.
    pub negative_hits: u64,
    /// Reads that found nothing live.
    pub misses: u64,
    /// Entries currently stored (including negative markers).
    pub entry_count: u64,
    /// Entries removed because they expired (lazy check or sweep).
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate over all answered reads (0.0 to 1.0), counting negative
    /// hits as hits.
    pub fn hit_rate(&self) -> f64 {
        let answered = self.hits + self.negative_hits;
        let total = answered + self.misses;
        if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        }
    }
}
