//! Cache module - read-through banner cache with sliding expiry.
//!
//! ## Architecture
//!
//! - `BannerCache` - Moka value map in front of a `BannerStore`
//! - `Debouncer` - per-key resettable timer; its fire evicts the key
//! - `CacheConfig` - idle window and optional capacity
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = BannerCache::new(store, CacheConfig::default());
//!
//! // Miss: fetched and cached. Hit: served and expiry pushed forward.
//! let content = cache.get(BannerKey::new(1, 1), false, false).await?;
//!
//! // After a write touching the key
//! cache.invalidate(BannerKey::new(1, 1));
//! ```

mod banner_cache;
mod config;
mod debounce;

pub use banner_cache::{BannerCache, CacheStats};
pub use config::CacheConfig;
pub use debounce::{Debouncer, TimerPhase};
