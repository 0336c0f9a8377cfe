//! Banner service - the surface handed to the request layer.
//!
//! Reads go through the [`BannerCache`]; writes go to the store and then
//! invalidate every key the store reports as affected.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::banner::{Banner, BannerKey, BannerPatch, BannerQuery, NewBanner, PatchPlan};
use crate::cache::{BannerCache, CacheConfig};
use crate::database::BannerStore;
use crate::error::BannerResult;

/// Explicitly constructed service; call [`BannerService::shutdown`] on teardown.
pub struct BannerService {
    store: Arc<dyn BannerStore>,
    cache: BannerCache,
}

impl BannerService {
    pub fn new(store: Arc<dyn BannerStore>, config: CacheConfig) -> Self {
        let cache = BannerCache::new(Arc::clone(&store), config);
        Self { store, cache }
    }

    /// Banner content for a (tag, feature) pair.
    pub async fn lookup(
        &self,
        tag_id: i64,
        feature_id: i64,
        skip_cache: bool,
        privileged: bool,
    ) -> BannerResult<Value> {
        self.cache
            .get(BannerKey::new(tag_id, feature_id), skip_cache, privileged)
            .await
    }

    pub fn invalidate(&self, tag_id: i64, feature_id: i64) {
        self.cache.invalidate(BannerKey::new(tag_id, feature_id));
    }

    /// Apply a partial update to banner `id`.
    ///
    /// A rejected patch touches neither the store nor the cache.
    pub async fn patch(&self, id: i64, patch: &BannerPatch) -> BannerResult<()> {
        let plan = PatchPlan::build(patch).inspect_err(|e| {
            warn!(id, error = %e, "Rejected banner patch");
        })?;

        let affected = self.store.apply_patch(id, &plan).await?;
        self.cache.invalidate_many(affected);
        info!(id, "Banner patched");
        Ok(())
    }

    pub async fn create(&self, banner: &NewBanner) -> BannerResult<i64> {
        banner.validate().inspect_err(|e| {
            warn!(error = %e, "Rejected new banner");
        })?;

        let id = self.store.create(banner).await?;
        self.cache.invalidate_many(banner.keys());
        info!(id, "Banner created");
        Ok(id)
    }

    /// Admin listing; always read from the store.
    pub async fn list(&self, query: &BannerQuery) -> BannerResult<Vec<Banner>> {
        query.validate()?;
        self.store.list(query).await
    }

    pub async fn delete(&self, id: i64) -> BannerResult<()> {
        let affected = self.store.delete(id).await?;
        self.cache.invalidate_many(affected);
        info!(id, "Banner deleted");
        Ok(())
    }

    pub fn cache(&self) -> &BannerCache {
        &self.cache
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
        info!("Banner service stopped");
    }
}
