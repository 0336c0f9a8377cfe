//! bannerd - service entry point.
//!
//! Wires configuration, logging, the configured store and the banner
//! service, then runs until Ctrl-C.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use bannerd::BannerService;
use bannerd::config::{Config, StoreBackend};
use bannerd::database::{BannerStore, Database, MemoryBannerStore, MongoBannerStore};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bannerd=info,mongodb=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting bannerd...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Store backend: {:?}", config.store);

    let store: Arc<dyn BannerStore> = match config.store {
        StoreBackend::Mongo => {
            let uri = config.mongodb_uri.as_deref().unwrap_or_default();
            info!("Connecting to MongoDB...");
            let db = Database::connect(uri, &config.mongodb_database).await?;
            let store = MongoBannerStore::new(&db);
            store.ensure_indexes().await?;
            info!("Database connected");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryBannerStore::new())
        }
    };

    let service = BannerService::new(store, config.cache.clone());
    info!("Banner service ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    service.shutdown();
    Ok(())
}
