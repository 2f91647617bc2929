//! Cached resource service.
//!
//! Orchestrates cache-aside reads and refresh-on-write invalidation around
//! an [`UpstreamRepository`], with every upstream call going through a
//! [`ResiliencePipeline`]. Reads go cache first; a miss runs the upstream
//! fetch through the pipeline (single-flight per key) and populates the
//! cache. Writes mutate the upstream first, then eagerly re-cache the
//! affected entity and invalidate the collection and owner entries.
//!
//! Refresh-on-write trades a small staleness window (an external data
//! change is visible only after the next refresh or natural expiry) for
//! read availability. A failed write leaves the cache untouched, so stale
//! but valid entries keep serving. Cache faults after a mutation already
//! succeeded are logged and absorbed; the caller gets the write result,
//! and any stale per-entity entry is dropped rather than left behind.

use std::marker::PhantomData;
use std::sync::Arc;

use bulwark_cache::{CacheStore, KeyScheme};
use bulwark_core::{BulwarkResult, CacheEntryOptions};
use bulwark_resilience::ResiliencePipeline;
use tracing::{debug, warn};

use crate::resource::CacheableResource;
use crate::upstream::UpstreamRepository;

/// Cache-aside orchestration of one resource family.
///
/// Generic over the entity type `T`, the upstream repository `U` and the
/// cache backend `C`, so the same refresh logic serves an in-memory cache,
/// a remote cache, or any repository.
pub struct CachedResourceService<T, U, C>
where
    T: CacheableResource,
    U: UpstreamRepository<T> + 'static,
    C: CacheStore,
{
    upstream: Arc<U>,
    cache: Arc<C>,
    pipeline: Arc<ResiliencePipeline>,
    keys: KeyScheme,
    entry_options: CacheEntryOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T, U, C> CachedResourceService<T, U, C>
where
    T: CacheableResource,
    U: UpstreamRepository<T> + 'static,
    C: CacheStore,
{
    /// Create a service for one resource family.
    pub fn new(
        upstream: Arc<U>,
        cache: Arc<C>,
        pipeline: Arc<ResiliencePipeline>,
        keys: KeyScheme,
        entry_options: CacheEntryOptions,
    ) -> Self {
        Self {
            upstream,
            cache,
            pipeline,
            keys,
            entry_options,
            _entity: PhantomData,
        }
    }

    /// The key scheme this service caches under.
    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    /// The pipeline guarding upstream calls.
    pub fn pipeline(&self) -> &ResiliencePipeline {
        &self.pipeline
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Get an entity by id, cache first.
    ///
    /// `Ok(None)` means the upstream has no such entity; that answer is
    /// negative-cached so repeated lookups of a missing id do not hammer
    /// the upstream.
    pub async fn get(&self, id: &T::Id) -> BulwarkResult<Option<T>> {
        let key = self.keys.entity(id);
        let pipeline = Arc::clone(&self.pipeline);
        let upstream = Arc::clone(&self.upstream);
        let id = id.clone();
        self.cache
            .get_or_create(&key, &self.entry_options, move || async move {
                pipeline
                    .execute(|| async move { upstream.fetch_by_id(&id).await })
                    .await
            })
            .await
    }

    /// List the whole collection, cache first.
    pub async fn list(&self) -> BulwarkResult<Vec<T>> {
        let key = self.keys.collection();
        let pipeline = Arc::clone(&self.pipeline);
        let upstream = Arc::clone(&self.upstream);
        let listed: Option<Vec<T>> = self
            .cache
            .get_or_create(&key, &self.entry_options, move || async move {
                pipeline
                    .execute(|| async move { upstream.fetch_all().await })
                    .await
                    .map(Some)
            })
            .await?;
        Ok(listed.unwrap_or_default())
    }

    /// List one owner's entities, cache first.
    pub async fn list_for_owner(&self, owner: &str) -> BulwarkResult<Vec<T>> {
        let key = self.keys.owner(owner);
        let pipeline = Arc::clone(&self.pipeline);
        let upstream = Arc::clone(&self.upstream);
        let owner = owner.to_string();
        let listed: Option<Vec<T>> = self
            .cache
            .get_or_create(&key, &self.entry_options, move || async move {
                pipeline
                    .execute(|| async move { upstream.fetch_for_owner(&owner).await })
                    .await
                    .map(Some)
            })
            .await?;
        Ok(listed.unwrap_or_default())
    }

    // ========================================================================
    // WRITES (refresh-on-write)
    // ========================================================================

    /// Create an entity, then refresh the cache.
    pub async fn create(&self, entity: T) -> BulwarkResult<T> {
        let upstream = Arc::clone(&self.upstream);
        let created = self
            .pipeline
            .execute(move || async move { upstream.insert(entity).await })
            .await?;
        self.refresh_after_write(&created).await;
        Ok(created)
    }

    /// Update an entity, then refresh the cache.
    pub async fn update(&self, entity: T) -> BulwarkResult<T> {
        let upstream = Arc::clone(&self.upstream);
        let updated = self
            .pipeline
            .execute(move || async move { upstream.update(entity).await })
            .await?;
        self.refresh_after_write(&updated).await;
        Ok(updated)
    }

    /// Delete an entity, then drop its cache entries. Returns whether the
    /// entity existed.
    pub async fn delete(&self, id: &T::Id) -> BulwarkResult<bool> {
        let upstream = Arc::clone(&self.upstream);
        let owned_id = id.clone();
        let deleted = self
            .pipeline
            .execute(move || async move { upstream.delete(&owned_id).await })
            .await?;

        let Some(entity) = deleted else {
            return Ok(false);
        };
        self.remove_quietly(&self.keys.entity(id)).await;
        self.remove_quietly(&self.keys.collection()).await;
        if let Some(owner) = entity.owner() {
            self.remove_quietly(&self.keys.owner(&owner)).await;
        }
        debug!(key = %self.keys.entity(id), "Invalidated cache after delete");
        Ok(true)
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Drop one owner's cached listing. Returns the number of entries
    /// removed.
    pub async fn invalidate_owner(&self, owner: &str) -> BulwarkResult<u64> {
        self.cache.remove_by_prefix(&self.keys.owner(owner)).await
    }

    /// Drop every cache entry in this resource family. Returns the number
    /// of entries removed.
    pub async fn invalidate_all(&self) -> BulwarkResult<u64> {
        self.cache.remove_by_prefix(&self.keys.prefix()).await
    }

    /// Eagerly re-cache the written entity and invalidate the listings it
    /// appears in. Runs only after the upstream mutation succeeded, so
    /// cache faults are absorbed here: the write itself is done, and a
    /// re-cache failure must not report it as failed. A failed re-cache
    /// drops the old entry instead, so the pre-write value cannot keep
    /// serving.
    async fn refresh_after_write(&self, entity: &T) {
        let key = self.keys.entity(entity.resource_id());
        if let Err(error) = self.cache.set(&key, entity, &self.entry_options).await {
            warn!(key, %error, "Failed to re-cache written entity, dropping the old entry");
            self.remove_quietly(&key).await;
        }
        self.remove_quietly(&self.keys.collection()).await;
        if let Some(owner) = entity.owner() {
            self.remove_quietly(&self.keys.owner(&owner)).await;
        }
        debug!(key, "Refreshed cache after write");
    }

    /// Remove a key, downgrading backend faults to a warning; a key that
    /// cannot be removed expires on its own.
    async fn remove_quietly(&self, key: &str) {
        if let Err(error) = self.cache.remove(key).await {
            warn!(key, %error, "Cache invalidation failed, entry expires naturally");
        }
    }
}

impl<T, U, C> std::fmt::Debug for CachedResourceService<T, U, C>
where
    T: CacheableResource,
    U: UpstreamRepository<T> + 'static,
    C: CacheStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResourceService")
            .field("namespace", &self.keys.namespace())
            .field("pipeline", &self.pipeline.name())
            .finish()
    }
}
