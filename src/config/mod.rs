//! Configuration module for bannerd.
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::cache::CacheConfig;

/// Which store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,

    // MongoDB
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from the process environment (and `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through a variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let store = match var("BANNER_STORE")
            .unwrap_or_else(|| "mongo".to_string())
            .to_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StoreBackend::Mongo,
            "memory" => StoreBackend::Memory,
            other => bail!("BANNER_STORE must be `mongo` or `memory`, got `{other}`"),
        };

        let mongodb_uri = var("MONGODB_URI").filter(|uri| !uri.trim().is_empty());
        if store == StoreBackend::Mongo && mongodb_uri.is_none() {
            bail!("MONGODB_URI must be set when BANNER_STORE is mongo");
        }

        let mut cache = CacheConfig::default();
        if let Some(raw) = var("CACHE_IDLE_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("CACHE_IDLE_SECS is not a number: `{raw}`"))?;
            if secs == 0 {
                bail!("CACHE_IDLE_SECS must be greater than zero");
            }
            cache = cache.idle_window(Duration::from_secs(secs));
        }
        if let Some(raw) = var("CACHE_MAX_CAPACITY") {
            let capacity: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("CACHE_MAX_CAPACITY is not a number: `{raw}`"))?;
            cache = cache.max_capacity(capacity);
        }

        Ok(Self {
            store,
            mongodb_uri,
            mongodb_database: var("MONGODB_DATABASE").unwrap_or_else(|| "banners".to_string()),
            cache,
        })
    }
}
