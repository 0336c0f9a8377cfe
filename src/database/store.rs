//! Storage contract consumed by the cache and the service.

use async_trait::async_trait;

use crate::banner::{Banner, BannerDocument, BannerKey, BannerQuery, NewBanner, PatchPlan};
use crate::error::BannerResult;

/// Persistence backend for banners.
///
/// Implementations must apply each mutating call atomically: either every
/// field of the plan lands or none does.
#[async_trait]
pub trait BannerStore: Send + Sync {
    /// Fetch the banner served under `key`.
    ///
    /// Returns `NotFound` when nothing matches and `AccessDenied` when the
    /// document fails [`BannerDocument::check_visible`] for `privileged`.
    async fn fetch(&self, key: BannerKey, privileged: bool) -> BannerResult<BannerDocument>;

    /// Execute a patch plan against banner `id`.
    ///
    /// Returns the keys the banner was reachable under before and after the
    /// mutation, or `NotFound` when no such banner exists.
    async fn apply_patch(&self, id: i64, plan: &PatchPlan) -> BannerResult<Vec<BannerKey>>;

    /// Persist a new banner and return its id.
    async fn create(&self, banner: &NewBanner) -> BannerResult<i64>;

    /// List banners matching the query, ordered by id.
    async fn list(&self, query: &BannerQuery) -> BannerResult<Vec<Banner>>;

    /// Delete banner `id`, returning the keys it was reachable under.
    async fn delete(&self, id: i64) -> BannerResult<Vec<BannerKey>>;
}

/// Union of two key sets, sorted and without duplicates.
pub(crate) fn merge_keys(mut before: Vec<BannerKey>, after: Vec<BannerKey>) -> Vec<BannerKey> {
    before.extend(after);
    before.sort_unstable();
    before.dedup();
    before
}
