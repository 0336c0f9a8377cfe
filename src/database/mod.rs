//! Database module exports.

mod banner_repository;
mod memory;
mod mongo;
mod query;
mod store;

pub use banner_repository::MongoBannerStore;
pub use memory::MemoryBannerStore;
pub use mongo::Database;
pub use query::{content_to_bson, fields, plan_update, FilterBuilder, UpdateBuilder};
pub use store::BannerStore;
