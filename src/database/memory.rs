//! In-process banner store.
//!
//! Backs local runs (`BANNER_STORE=memory`) and doubles as the store in
//! service tests: it counts fetches and records every plan it applied.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::store::{merge_keys, BannerStore};
use crate::banner::{Banner, BannerDocument, BannerKey, BannerQuery, NewBanner, PatchPlan};
use crate::error::{BannerError, BannerResult};

/// [`BannerStore`] keeping banners in a map ordered by id.
#[derive(Debug, Default)]
pub struct MemoryBannerStore {
    banners: RwLock<BTreeMap<i64, Banner>>,
    last_id: AtomicI64,
    fetches: AtomicUsize,
    applied: Mutex<Vec<(i64, PatchPlan)>>,
}

impl MemoryBannerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored banner.
    pub fn get(&self, id: i64) -> Option<Banner> {
        self.banners.read().get(&id).cloned()
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Every successfully applied plan, in order.
    pub fn applied_plans(&self) -> Vec<(i64, PatchPlan)> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl BannerStore for MemoryBannerStore {
    async fn fetch(&self, key: BannerKey, privileged: bool) -> BannerResult<BannerDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let doc = self
            .banners
            .read()
            .values()
            .find(|banner| banner.matches(key))
            .map(Banner::document)
            .ok_or(BannerError::NotFound)?;

        doc.check_visible(privileged)?;
        Ok(doc)
    }

    async fn apply_patch(&self, id: i64, plan: &PatchPlan) -> BannerResult<Vec<BannerKey>> {
        let mut banners = self.banners.write();
        let banner = banners.get_mut(&id).ok_or(BannerError::NotFound)?;

        let before = banner.keys();
        plan.apply(banner, Utc::now());
        let affected = merge_keys(before, banner.keys());

        self.applied.lock().push((id, plan.clone()));
        debug!(id, "Patched banner in memory");
        Ok(affected)
    }

    async fn create(&self, banner: &NewBanner) -> BannerResult<i64> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.banners
            .write()
            .insert(id, Banner::new(id, banner, Utc::now()));
        Ok(id)
    }

    async fn list(&self, query: &BannerQuery) -> BannerResult<Vec<Banner>> {
        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(self
            .banners
            .read()
            .values()
            .filter(|banner| query.matches(banner))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> BannerResult<Vec<BannerKey>> {
        let banner = self
            .banners
            .write()
            .remove(&id)
            .ok_or(BannerError::NotFound)?;
        Ok(banner.keys())
    }
}
