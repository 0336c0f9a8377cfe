//! Cache configuration.

use std::time::Duration;

/// Configuration for the banner cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Quiet period after which an untouched entry is evicted.
    pub idle_window: Duration,

    /// Optional upper bound on resident entries.
    /// Unbounded when `None`.
    pub max_capacity: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_window: Duration::from_secs(300), // 5 minutes
            max_capacity: None,
        }
    }
}

impl CacheConfig {
    /// Set the idle window (builder pattern).
    #[must_use]
    pub fn idle_window(mut self, window: Duration) -> Self {
        self.idle_window = window;
        self
    }

    /// Set max capacity for the value map.
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = Some(max_capacity);
        self
    }
}
