//! Banner domain: models, the tri-state patch field and the patch planner.

mod models;
mod optional;
mod plan;

pub use models::{
    banner_keys, Banner, BannerDocument, BannerKey, BannerPatch, BannerQuery, Content, NewBanner,
};
pub use optional::Optional;
pub use plan::{FieldAction, PatchPlan, PlanStep};
