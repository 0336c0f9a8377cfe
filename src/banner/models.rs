//! Banner domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Optional;
use crate::error::{BannerError, BannerResult};

/// Arbitrary JSON object carried by a banner.
pub type Content = serde_json::Map<String, Value>;

/// Lookup key: one tag and one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BannerKey {
    pub tag_id: i64,
    pub feature_id: i64,
}

impl BannerKey {
    pub fn new(tag_id: i64, feature_id: i64) -> Self {
        Self { tag_id, feature_id }
    }
}

impl std::fmt::Display for BannerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tag={} feature={}", self.tag_id, self.feature_id)
    }
}

/// A stored banner.
///
/// `None` on a mutable attribute means the attribute was cleared by a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    #[serde(rename = "banner_id")]
    pub id: i64,
    pub tag_ids: Option<Vec<i64>>,
    pub feature_id: Option<i64>,
    pub content: Option<Content>,
    pub is_active: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Banner {
    /// Build a freshly created banner.
    pub fn new(id: i64, banner: &NewBanner, now: DateTime<Utc>) -> Self {
        Self {
            id,
            tag_ids: Some(banner.tag_ids.clone()),
            feature_id: Some(banner.feature_id),
            content: Some(banner.content.clone()),
            is_active: Some(banner.is_active),
            created_at: now,
            updated_at: now,
        }
    }

    /// Every key this banner can be looked up under.
    pub fn keys(&self) -> Vec<BannerKey> {
        banner_keys(self.tag_ids.as_deref(), self.feature_id)
    }

    /// Whether the banner is reachable under `key`.
    pub fn matches(&self, key: BannerKey) -> bool {
        self.feature_id == Some(key.feature_id)
            && self
                .tag_ids
                .as_ref()
                .is_some_and(|tags| tags.contains(&key.tag_id))
    }

    /// The part of the banner served to lookups.
    pub fn document(&self) -> BannerDocument {
        BannerDocument {
            content: self.content.clone(),
            is_active: self.is_active,
        }
    }
}

/// Cartesian product of tags and feature; empty when either is cleared.
pub fn banner_keys(tag_ids: Option<&[i64]>, feature_id: Option<i64>) -> Vec<BannerKey> {
    match (tag_ids, feature_id) {
        (Some(tags), Some(feature_id)) => tags
            .iter()
            .map(|&tag_id| BannerKey::new(tag_id, feature_id))
            .collect(),
        _ => Vec::new(),
    }
}

/// Cached lookup value: the payload plus its activation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerDocument {
    pub content: Option<Content>,
    pub is_active: Option<bool>,
}

impl BannerDocument {
    /// Apply the visibility rule for a caller.
    ///
    /// Inactive banners are only visible to privileged callers, and a banner
    /// whose flag was cleared is visible to nobody.
    pub fn check_visible(&self, privileged: bool) -> BannerResult<()> {
        match self.is_active {
            Some(true) => Ok(()),
            Some(false) if privileged => Ok(()),
            _ => Err(BannerError::AccessDenied),
        }
    }

    /// Payload as JSON; a cleared payload is `null`.
    pub fn to_value(&self) -> Value {
        self.content
            .as_ref()
            .map_or(Value::Null, |content| Value::Object(content.clone()))
    }
}

/// Payload for creating a banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBanner {
    pub tag_ids: Vec<i64>,
    pub feature_id: i64,
    pub content: Content,
    pub is_active: bool,
}

impl NewBanner {
    pub fn validate(&self) -> BannerResult<()> {
        if self.tag_ids.is_empty() {
            return Err(BannerError::invalid("tag_ids must not be empty"));
        }
        if let Some(tag) = self.tag_ids.iter().find(|&&tag| tag <= 0) {
            return Err(BannerError::invalid(format!("tag id {tag} is not positive")));
        }
        if self.feature_id <= 0 {
            return Err(BannerError::invalid(format!(
                "feature id {} is not positive",
                self.feature_id
            )));
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<BannerKey> {
        banner_keys(Some(&self.tag_ids), Some(self.feature_id))
    }
}

/// Partial update payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerPatch {
    #[serde(skip_serializing_if = "Optional::is_omitted")]
    pub tag_ids: Optional<Vec<i64>>,
    #[serde(skip_serializing_if = "Optional::is_omitted")]
    pub feature_id: Optional<i64>,
    #[serde(skip_serializing_if = "Optional::is_omitted")]
    pub content: Optional<Content>,
    #[serde(skip_serializing_if = "Optional::is_omitted")]
    pub is_active: Optional<bool>,
}

/// Filters for the admin listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerQuery {
    pub tag_id: Option<i64>,
    pub feature_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl BannerQuery {
    pub fn validate(&self) -> BannerResult<()> {
        if let Some(tag) = self.tag_id.filter(|&tag| tag <= 0) {
            return Err(BannerError::invalid(format!("tag id {tag} is not positive")));
        }
        if let Some(feature) = self.feature_id.filter(|&feature| feature <= 0) {
            return Err(BannerError::invalid(format!(
                "feature id {feature} is not positive"
            )));
        }
        Ok(())
    }

    /// Whether a banner passes the tag and feature filters.
    pub fn matches(&self, banner: &Banner) -> bool {
        let feature_ok = self
            .feature_id
            .is_none_or(|feature| banner.feature_id == Some(feature));
        let tag_ok = self.tag_id.is_none_or(|tag| {
            banner
                .tag_ids
                .as_ref()
                .is_some_and(|tags| tags.contains(&tag))
        });
        feature_ok && tag_ok
    }
}
