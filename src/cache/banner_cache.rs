//! Read-through banner cache with sliding expiry.
//!
//! Values live in a Moka map; each resident key owns a [`Debouncer`] in a
//! separate `DashMap`. The DashMap entry lock is the per-key critical section:
//! storing a fetched value, re-arming a fired timer, evicting and invalidating
//! all happen while holding it, so a key never ends up with two live timers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use moka::sync::Cache;
use serde_json::Value;
use tracing::{debug, info};

use super::{CacheConfig, Debouncer};
use crate::banner::{BannerDocument, BannerKey};
use crate::database::BannerStore;
use crate::error::BannerResult;

type Values = Cache<BannerKey, Arc<BannerDocument>>;
type Timers = DashMap<BannerKey, ExpirySlot>;

/// Timer for one key; `serial` tells successive timers of the same key apart.
struct ExpirySlot {
    serial: u64,
    timer: Debouncer,
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub resident: usize,
    pub timers: usize,
}

/// Read-through cache in front of a [`BannerStore`].
pub struct BannerCache {
    store: Arc<dyn BannerStore>,
    values: Values,
    timers: Arc<Timers>,
    /// Bumped by every invalidation; a fill that started under an older
    /// epoch is returned to its caller but not stored.
    epoch: AtomicU64,
    serial: AtomicU64,
    closed: AtomicBool,
    config: CacheConfig,
}

impl BannerCache {
    pub fn new(store: Arc<dyn BannerStore>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder().name("banners");
        if let Some(max_capacity) = config.max_capacity {
            builder = builder.max_capacity(max_capacity);
        }

        info!(idle_window = ?config.idle_window, "Banner cache initialized");

        Self {
            store,
            values: builder.build(),
            timers: Arc::new(DashMap::new()),
            epoch: AtomicU64::new(0),
            serial: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// Look up the banner for `key` on behalf of a caller.
    ///
    /// With `bypass_cache` the store is asked directly and nothing is cached.
    /// Otherwise a hit slides the key's expiry and a miss fetches, stores and
    /// arms it. Store errors propagate unchanged and leave the key untouched.
    pub async fn get(
        &self,
        key: BannerKey,
        bypass_cache: bool,
        privileged: bool,
    ) -> BannerResult<Value> {
        if bypass_cache {
            debug!(%key, "Banner cache bypassed");
            let doc = self.store.fetch(key, privileged).await?;
            return Ok(doc.to_value());
        }

        if let Some(doc) = self.values.get(&key) {
            debug!(%key, "Banner cache hit");
            self.touch(key);
            doc.check_visible(privileged)?;
            return Ok(doc.to_value());
        }

        debug!(%key, "Banner cache miss");

        // Fetch the unfiltered document so one entry serves every caller;
        // visibility is decided per caller below.
        let observed = self.epoch.load(Ordering::Acquire);
        let doc = Arc::new(self.store.fetch(key, true).await?);
        self.fill(key, observed, Arc::clone(&doc));

        doc.check_visible(privileged)?;
        Ok(doc.to_value())
    }

    /// Drop `key` from the cache. Safe whether or not it is resident.
    pub fn invalidate(&self, key: BannerKey) {
        let slot = self.timers.entry(key);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.values.invalidate(&key);
        if let Entry::Occupied(slot) = slot {
            slot.remove().timer.cancel();
        }
        debug!(%key, "Banner cache invalidated");
    }

    pub fn invalidate_many(&self, keys: impl IntoIterator<Item = BannerKey>) {
        for key in keys {
            self.invalidate(key);
        }
    }

    /// Whether a value for `key` is resident.
    pub fn contains(&self, key: BannerKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.values.iter().count(),
            timers: self.timers.len(),
        }
    }

    /// Cancel every timer and drop every value. Later lookups go straight
    /// to the store.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.timers.retain(|_, slot| {
            slot.timer.cancel();
            false
        });
        self.values.invalidate_all();
        info!("Banner cache shut down");
    }

    /// Slide the expiry of a resident key.
    fn touch(&self, key: BannerKey) {
        // A vacant slot means the entry was evicted after our read; don't
        // arm a timer for a value that is gone.
        if let Entry::Occupied(mut slot) = self.timers.entry(key)
            && !slot.get().timer.touch()
        {
            slot.insert(self.arm(key));
        }
    }

    /// Store a fetched value and arm its timer, unless an invalidation
    /// happened since `observed` was read.
    fn fill(&self, key: BannerKey, observed: u64, doc: Arc<BannerDocument>) {
        let slot = self.timers.entry(key);

        if self.closed.load(Ordering::Acquire) || self.epoch.load(Ordering::Acquire) != observed {
            debug!(%key, "Banner changed during fetch, not caching");
            return;
        }

        self.values.insert(key, doc);
        match slot {
            Entry::Occupied(mut slot) => {
                if !slot.get().timer.touch() {
                    slot.insert(self.arm(key));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(self.arm(key));
            }
        }
    }

    /// New armed timer for `key` whose fire evicts that key.
    fn arm(&self, key: BannerKey) -> ExpirySlot {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let values = self.values.clone();
        let timers = Arc::downgrade(&self.timers);

        let timer = Debouncer::new(self.config.idle_window, move || {
            evict(&timers, &values, key, serial);
        });
        timer.touch();

        ExpirySlot { serial, timer }
    }
}

impl std::fmt::Debug for BannerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BannerCache")
            .field("config", &self.config)
            .field("timers", &self.timers.len())
            .finish()
    }
}

/// Timer callback: remove `key` only if `serial` is still its current timer.
fn evict(timers: &Weak<Timers>, values: &Values, key: BannerKey, serial: u64) {
    let Some(timers) = timers.upgrade() else {
        return;
    };

    if let Entry::Occupied(slot) = timers.entry(key)
        && slot.get().serial == serial
    {
        slot.remove();
        values.invalidate(&key);
        debug!(%key, "Banner evicted after idle window");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use crate::banner::{Banner, BannerQuery, NewBanner, PatchPlan};
    use crate::error::BannerError;

    const WINDOW: Duration = Duration::from_secs(300);

    /// Store double: serves one document, counts fetches, can fail or pause.
    #[derive(Default)]
    struct ScriptedStore {
        doc: Mutex<Option<BannerDocument>>,
        failing: AtomicBool,
        fetches: AtomicUsize,
        /// (entered, release) pair for pausing the next fetch.
        gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    }

    impl ScriptedStore {
        fn serving(value: Value, is_active: bool) -> Arc<Self> {
            let store = Self::default();
            store.set(value, is_active);
            Arc::new(store)
        }

        fn set(&self, value: Value, is_active: bool) {
            *self.doc.lock() = Some(BannerDocument {
                content: value.as_object().cloned(),
                is_active: Some(is_active),
            });
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn pause_next_fetch(&self) -> (Arc<Notify>, Arc<Notify>) {
            let gate = (Arc::new(Notify::new()), Arc::new(Notify::new()));
            *self.gate.lock() = Some(gate.clone());
            gate
        }
    }

    #[async_trait]
    impl BannerStore for ScriptedStore {
        async fn fetch(&self, _key: BannerKey, privileged: bool) -> BannerResult<BannerDocument> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Read before pausing so a paused fetch returns what it saw on entry.
            let snapshot = self.doc.lock().clone();

            let gate = self.gate.lock().take();
            if let Some((entered, release)) = gate {
                entered.notify_one();
                release.notified().await;
            }

            if self.failing.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("storage unavailable").into());
            }
            let doc = snapshot.ok_or(BannerError::NotFound)?;
            doc.check_visible(privileged)?;
            Ok(doc)
        }

        async fn apply_patch(&self, _id: i64, _plan: &PatchPlan) -> BannerResult<Vec<BannerKey>> {
            unreachable!("not used by cache tests")
        }

        async fn create(&self, _banner: &NewBanner) -> BannerResult<i64> {
            unreachable!("not used by cache tests")
        }

        async fn list(&self, _query: &BannerQuery) -> BannerResult<Vec<Banner>> {
            unreachable!("not used by cache tests")
        }

        async fn delete(&self, _id: i64) -> BannerResult<Vec<BannerKey>> {
            unreachable!("not used by cache tests")
        }
    }

    fn cache_over(store: &Arc<ScriptedStore>) -> BannerCache {
        BannerCache::new(
            Arc::clone(store) as Arc<dyn BannerStore>,
            CacheConfig::default().idle_window(WINDOW),
        )
    }

    fn sky() -> Value {
        json!({"color": "blue", "object": "sky"})
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_lookup_is_served_from_cache() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = cache_over(&store);
        let key = BannerKey::new(1, 1);

        let first = cache.get(key, false, false).await.unwrap();
        assert_eq!(first, sky());
        assert_eq!(store.fetches(), 1);

        sleep(WINDOW / 2).await;
        let second = cache.get(key, false, false).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bypass_reads_store_and_caches_nothing() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = cache_over(&store);
        let key = BannerKey::new(1, 1);

        cache.get(key, true, false).await.unwrap();
        cache.get(key, true, false).await.unwrap();

        assert_eq!(store.fetches(), 2);
        assert!(!cache.contains(key));
        assert_eq!(cache.stats().timers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bypass_sees_fresh_data_over_cached_value() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = cache_over(&store);
        let key = BannerKey::new(1, 1);

        cache.get(key, false, false).await.unwrap();
        store.set(json!({"color": "grey"}), true);

        assert_eq!(cache.get(key, true, false).await.unwrap(), json!({"color": "grey"}));
        assert_eq!(cache.get(key, false, false).await.unwrap(), sky());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_is_not_cached() {
        let store = ScriptedStore::serving(sky(), true);
        store.failing.store(true, Ordering::SeqCst);
        let cache = cache_over(&store);
        let key = BannerKey::new(3, 4);

        let err = cache.get(key, false, false).await.unwrap_err();
        assert!(matches!(err, BannerError::Collaborator(_)));
        assert!(!cache.contains(key));
        assert_eq!(cache.stats().timers, 0);

        store.failing.store(false, Ordering::SeqCst);
        assert_eq!(cache.get(key, false, false).await.unwrap(), sky());
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_cached() {
        let store = Arc::new(ScriptedStore::default());
        let cache = cache_over(&store);
        let key = BannerKey::new(9, 9);

        assert!(cache.get(key, false, false).await.unwrap_err().is_not_found());
        assert!(cache.get(key, false, false).await.unwrap_err().is_not_found());
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_banner_is_not_leaked_to_unprivileged() {
        let store = ScriptedStore::serving(sky(), false);
        let cache = cache_over(&store);
        let key = BannerKey::new(1, 2);

        // Unprivileged miss: denied, but the raw document is now resident.
        let err = cache.get(key, false, false).await.unwrap_err();
        assert!(matches!(err, BannerError::AccessDenied));

        assert_eq!(cache.get(key, false, true).await.unwrap(), sky());
        let err = cache.get(key, false, false).await.unwrap_err();
        assert!(matches!(err, BannerError::AccessDenied));
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_slides_then_expires() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = cache_over(&store);
        let key = BannerKey::new(1, 1);

        cache.get(key, false, false).await.unwrap();
        for _ in 0..3 {
            sleep(WINDOW - Duration::from_secs(1)).await;
            cache.get(key, false, false).await.unwrap();
        }
        assert_eq!(store.fetches(), 1);
        assert!(cache.contains(key));

        sleep(WINDOW + Duration::from_secs(1)).await;
        assert!(!cache.contains(key));
        assert_eq!(cache.stats(), CacheStats { resident: 0, timers: 0 });

        cache.get(key, false, false).await.unwrap();
        assert_eq!(store.fetches(), 2);
        assert_eq!(cache.stats().timers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_drops_value_and_timer() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = cache_over(&store);
        let key = BannerKey::new(1, 1);

        cache.invalidate(key);
        cache.get(key, false, false).await.unwrap();
        assert!(cache.contains(key));

        cache.invalidate(key);
        assert!(!cache.contains(key));
        assert_eq!(cache.stats().timers, 0);

        store.set(json!({"color": "green"}), true);
        assert_eq!(cache.get(key, false, false).await.unwrap(), json!({"color": "green"}));
        assert_eq!(store.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_started_before_invalidation_is_not_stored() {
        let store = ScriptedStore::serving(json!({"v": "old"}), true);
        let cache = Arc::new(cache_over(&store));
        let key = BannerKey::new(5, 6);

        let (entered, release) = store.pause_next_fetch();
        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(key, false, false).await })
        };

        // The reader now holds a pre-write document.
        entered.notified().await;
        store.set(json!({"v": "new"}), true);
        cache.invalidate(key);
        release.notify_one();

        assert_eq!(reader.await.unwrap().unwrap(), json!({"v": "old"}));
        assert!(!cache.contains(key));
        assert_eq!(cache.get(key, false, false).await.unwrap(), json!({"v": "new"}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_leave_one_value_and_one_timer() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = Arc::new(cache_over(&store));
        let key = BannerKey::new(2, 2);

        let mut readers = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            readers.push(tokio::spawn(async move { cache.get(key, false, false).await }));
        }
        for reader in readers {
            assert_eq!(reader.await.unwrap().unwrap(), sky());
        }

        assert_eq!(cache.stats(), CacheStats { resident: 1, timers: 1 });
        assert!(store.fetches() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_empties_cache() {
        let store = ScriptedStore::serving(sky(), true);
        let cache = cache_over(&store);

        cache.get(BannerKey::new(1, 1), false, false).await.unwrap();
        cache.get(BannerKey::new(2, 1), false, false).await.unwrap();
        assert_eq!(cache.stats().timers, 2);

        cache.shutdown();
        assert_eq!(cache.stats(), CacheStats { resident: 0, timers: 0 });

        // Still answers, without caching.
        cache.get(BannerKey::new(1, 1), false, false).await.unwrap();
        assert!(!cache.contains(BannerKey::new(1, 1)));
        assert_eq!(store.fetches(), 3);
    }
}
