//! Parameterized filter and update builders.
//!
//! Field names are compile-time constants; every caller-supplied value is
//! bound as a typed BSON value, never formatted into a command.

use anyhow::Context;
use mongodb::bson::{doc, Bson, DateTime, Document};

use crate::banner::{Content, FieldAction, PatchPlan, PlanStep};
use crate::error::BannerResult;

/// Banner document field names.
pub mod fields {
    pub const ID: &str = "_id";
    pub const TAG_IDS: &str = "tag_ids";
    pub const FEATURE_ID: &str = "feature_id";
    pub const CONTENT: &str = "content";
    pub const IS_ACTIVE: &str = "is_active";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Accumulates `(field, value)` conditions into a conjunctive filter.
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    filter: Document,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field == value`.
    #[must_use]
    pub fn eq(mut self, field: &'static str, value: impl Into<Bson>) -> Self {
        self.filter.insert(field, value.into());
        self
    }

    /// Array `field` holds `value`.
    #[must_use]
    pub fn contains(mut self, field: &'static str, value: impl Into<Bson>) -> Self {
        self.filter
            .insert(field, doc! { "$elemMatch": { "$eq": value.into() } });
        self
    }

    pub fn build(self) -> Document {
        self.filter
    }
}

/// Accumulates `(field, value)` assignments into a `$set` update.
#[derive(Debug, Clone, Default)]
pub struct UpdateBuilder {
    set: Document,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: &'static str, value: impl Into<Bson>) -> Self {
        self.set.insert(field, value.into());
        self
    }

    /// Bind an explicit null.
    #[must_use]
    pub fn clear(self, field: &'static str) -> Self {
        self.set(field, Bson::Null)
    }

    /// Translate one plan action; `Keep` adds nothing.
    #[must_use]
    pub fn action<T>(self, field: &'static str, action: &FieldAction<T>) -> Self
    where
        T: Clone + Into<Bson>,
    {
        match action {
            FieldAction::Keep => self,
            FieldAction::Clear => self.clear(field),
            FieldAction::Set(value) => self.set(field, value.clone()),
        }
    }

    pub fn build(self) -> Document {
        doc! { "$set": self.set }
    }
}

/// Encode banner content as a BSON document.
pub fn content_to_bson(content: &Content) -> BannerResult<Bson> {
    let document =
        mongodb::bson::to_document(content).context("failed to encode banner content")?;
    Ok(Bson::Document(document))
}

/// The update document executing `plan`, stamped with `now`.
pub fn plan_update(plan: &PatchPlan, now: DateTime) -> BannerResult<Document> {
    let mut update = UpdateBuilder::new();

    for step in plan.steps() {
        update = match step {
            PlanStep::TagIds(action) => update.action(fields::TAG_IDS, action),
            PlanStep::FeatureId(action) => update.action(fields::FEATURE_ID, action),
            PlanStep::Content(FieldAction::Keep) => update,
            PlanStep::Content(FieldAction::Clear) => update.clear(fields::CONTENT),
            PlanStep::Content(FieldAction::Set(content)) => {
                update.set(fields::CONTENT, content_to_bson(content)?)
            }
            PlanStep::IsActive(action) => update.action(fields::IS_ACTIVE, action),
            PlanStep::TouchUpdatedAt => update.set(fields::UPDATED_AT, now),
        };
    }

    Ok(update.build())
}
