//! Patch planner.
//!
//! Resolves a [`BannerPatch`] into a [`PatchPlan`]: one [`FieldAction`] per
//! mutable attribute plus an `updated_at` touch that always fires. Stores
//! execute the plan; nothing here talks to storage.

use chrono::{DateTime, Utc};

use super::{Banner, BannerPatch, Content, Optional};
use crate::error::{BannerError, BannerResult};

/// What to do with one stored attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldAction<T> {
    /// Leave the stored value unchanged.
    Keep,
    /// Clear the stored value.
    Clear,
    /// Replace the stored value.
    Set(T),
}

impl<T> FieldAction<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Apply the action to a stored attribute.
    pub fn apply_to(&self, slot: &mut Option<T>)
    where
        T: Clone,
    {
        match self {
            Self::Keep => {}
            Self::Clear => *slot = None,
            Self::Set(value) => *slot = Some(value.clone()),
        }
    }
}

impl<T: Clone> From<&Optional<T>> for FieldAction<T> {
    fn from(field: &Optional<T>) -> Self {
        match field {
            Optional::Omitted => Self::Keep,
            Optional::Null => Self::Clear,
            Optional::Value(value) => Self::Set(value.clone()),
        }
    }
}

/// One entry of a plan, in execution order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanStep<'a> {
    TagIds(&'a FieldAction<Vec<i64>>),
    FeatureId(&'a FieldAction<i64>),
    Content(&'a FieldAction<Content>),
    IsActive(&'a FieldAction<bool>),
    TouchUpdatedAt,
}

/// Field-by-field mutation derived from a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchPlan {
    pub tag_ids: FieldAction<Vec<i64>>,
    pub feature_id: FieldAction<i64>,
    pub content: FieldAction<Content>,
    pub is_active: FieldAction<bool>,
}

impl PatchPlan {
    /// Build the plan for a patch.
    ///
    /// Fails with `ValidationFailed` when a tag id in the new tag set is not
    /// positive. Every other combination, including an empty patch, yields a
    /// plan.
    pub fn build(patch: &BannerPatch) -> BannerResult<Self> {
        if let Some(tag) = patch
            .tag_ids
            .value()
            .and_then(|tags| tags.iter().find(|&&tag| tag <= 0))
        {
            return Err(BannerError::invalid(format!("tag id {tag} is not positive")));
        }

        Ok(Self {
            tag_ids: (&patch.tag_ids).into(),
            feature_id: (&patch.feature_id).into(),
            content: (&patch.content).into(),
            is_active: (&patch.is_active).into(),
        })
    }

    /// All steps in a stable order, ending with the timestamp touch.
    pub fn steps(&self) -> [PlanStep<'_>; 5] {
        [
            PlanStep::TagIds(&self.tag_ids),
            PlanStep::FeatureId(&self.feature_id),
            PlanStep::Content(&self.content),
            PlanStep::IsActive(&self.is_active),
            PlanStep::TouchUpdatedAt,
        ]
    }

    /// Whether the plan leaves every attribute alone (only the touch fires).
    pub fn is_touch_only(&self) -> bool {
        self.tag_ids.is_keep()
            && self.feature_id.is_keep()
            && self.content.is_keep()
            && self.is_active.is_keep()
    }

    /// Apply the plan to an in-memory banner.
    pub fn apply(&self, banner: &mut Banner, now: DateTime<Utc>) {
        for step in self.steps() {
            match step {
                PlanStep::TagIds(action) => action.apply_to(&mut banner.tag_ids),
                PlanStep::FeatureId(action) => action.apply_to(&mut banner.feature_id),
                PlanStep::Content(action) => action.apply_to(&mut banner.content),
                PlanStep::IsActive(action) => action.apply_to(&mut banner.is_active),
                PlanStep::TouchUpdatedAt => banner.updated_at = now,
            }
        }
    }
}
