//! bannerd - feature-flag banner lookup service.
//!
//! Banners are keyed by a (tag, feature) pair and carry a JSON payload plus
//! an activation flag.
//!
//! ## Architecture
//!
//! - `banner` - Domain models, tri-state patch fields, patch planner
//! - `cache` - Read-through cache with per-key sliding expiry
//! - `database` - Store contract with MongoDB and in-memory backends
//! - `service` - Service façade wiring cache and store together
//! - `config` - Environment configuration
//! - `error` - Error taxonomy

pub mod banner;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod service;

pub use error::{BannerError, BannerResult};
pub use service::BannerService;
