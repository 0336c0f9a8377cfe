//! MongoDB banner store.
//!
//! One document per banner in `banners`, keyed by a numeric `_id` drawn
//! from the `counters` collection. Tags are embedded, so every mutation is a
//! single-document write and therefore atomic.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::query::{content_to_bson, fields, plan_update, FilterBuilder};
use super::store::{merge_keys, BannerStore};
use super::Database;
use crate::banner::{
    banner_keys, Banner, BannerDocument, BannerKey, BannerQuery, Content, NewBanner, PatchPlan,
};
use crate::error::{BannerError, BannerResult};

const BANNER_COUNTER: &str = "banners";

/// Stored shape of a banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BannerRecord {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(default)]
    tag_ids: Option<Vec<i64>>,
    #[serde(default)]
    feature_id: Option<i64>,
    #[serde(default)]
    content: Option<Document>,
    #[serde(default)]
    is_active: Option<bool>,
    created_at: bson::DateTime,
    updated_at: bson::DateTime,
}

impl BannerRecord {
    fn new(id: i64, banner: &NewBanner, now: bson::DateTime) -> BannerResult<Self> {
        let bson::Bson::Document(content) = content_to_bson(&banner.content)? else {
            return Err(anyhow::anyhow!("banner content did not encode as a document").into());
        };

        Ok(Self {
            id,
            tag_ids: Some(banner.tag_ids.clone()),
            feature_id: Some(banner.feature_id),
            content: Some(content),
            is_active: Some(banner.is_active),
            created_at: now,
            updated_at: now,
        })
    }

    fn content(&self) -> BannerResult<Option<Content>> {
        self.content
            .clone()
            .map(bson::from_document::<Content>)
            .transpose()
            .with_context(|| format!("banner {} has undecodable content", self.id))
            .map_err(BannerError::from)
    }

    fn document(&self) -> BannerResult<BannerDocument> {
        Ok(BannerDocument {
            content: self.content()?,
            is_active: self.is_active,
        })
    }

    fn into_banner(self) -> BannerResult<Banner> {
        Ok(Banner {
            id: self.id,
            content: self.content()?,
            tag_ids: self.tag_ids,
            feature_id: self.feature_id,
            is_active: self.is_active,
            created_at: to_chrono(self.created_at),
            updated_at: to_chrono(self.updated_at),
        })
    }
}

fn to_chrono(at: bson::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(at.to_system_time())
}

/// Keys a stored banner was reachable under before `plan` ran, plus those it
/// is reachable under after.
///
/// Reads only the lookup fields of the raw before-image, so a document whose
/// other fields no longer decode still yields its keys.
fn patched_keys(before: &Document, plan: &PatchPlan) -> Vec<BannerKey> {
    let mut tag_ids = before
        .get_array(fields::TAG_IDS)
        .ok()
        .map(|tags| tags.iter().filter_map(as_i64).collect::<Vec<_>>());
    let mut feature_id = before.get(fields::FEATURE_ID).and_then(as_i64);
    let old = banner_keys(tag_ids.as_deref(), feature_id);

    plan.tag_ids.apply_to(&mut tag_ids);
    plan.feature_id.apply_to(&mut feature_id);
    merge_keys(old, banner_keys(tag_ids.as_deref(), feature_id))
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int64(n) => Some(*n),
        Bson::Int32(n) => Some(i64::from(*n)),
        _ => None,
    }
}

/// [`BannerStore`] backed by MongoDB.
#[derive(Debug, Clone)]
pub struct MongoBannerStore {
    banners: Collection<BannerRecord>,
    counters: Collection<Document>,
}

impl MongoBannerStore {
    pub fn new(db: &Database) -> Self {
        Self {
            banners: db.collection("banners"),
            counters: db.collection("counters"),
        }
    }

    /// Create the lookup index on `(feature_id, tag_ids)`.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "feature_id": 1, "tag_ids": 1 })
            .options(IndexOptions::builder().name("feature_tag".to_string()).build())
            .build();

        self.banners.create_index(index).await?;
        info!("Banner indexes ensured");
        Ok(())
    }

    async fn next_id(&self) -> BannerResult<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters
            .find_one_and_update(
                FilterBuilder::new().eq(fields::ID, BANNER_COUNTER).build(),
                doc! { "$inc": { "seq": 1_i64 } },
            )
            .with_options(options)
            .await
            .context("failed to allocate banner id")?
            .context("banner id counter missing after upsert")?;

        Ok(counter
            .get_i64("seq")
            .context("banner id counter is not an integer")?)
    }
}

#[async_trait]
impl BannerStore for MongoBannerStore {
    async fn fetch(&self, key: BannerKey, privileged: bool) -> BannerResult<BannerDocument> {
        let filter = FilterBuilder::new()
            .eq(fields::FEATURE_ID, key.feature_id)
            .contains(fields::TAG_IDS, key.tag_id)
            .build();

        let record = self
            .banners
            .find_one(filter)
            .await
            .context("failed to fetch banner")?
            .ok_or(BannerError::NotFound)?;

        let doc = record.document()?;
        doc.check_visible(privileged)?;
        debug!(%key, id = record.id, "Fetched banner from MongoDB");
        Ok(doc)
    }

    async fn apply_patch(&self, id: i64, plan: &PatchPlan) -> BannerResult<Vec<BannerKey>> {
        let update = plan_update(plan, bson::DateTime::now())?;
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();

        // Raw before-image: once the write has landed, nothing may fail on
        // the way to reporting the affected keys.
        let before = self
            .banners
            .clone_with_type::<Document>()
            .find_one_and_update(FilterBuilder::new().eq(fields::ID, id).build(), update)
            .with_options(options)
            .await
            .context("failed to patch banner")?
            .ok_or(BannerError::NotFound)?;

        debug!(id, "Patched banner in MongoDB");
        Ok(patched_keys(&before, plan))
    }

    async fn create(&self, banner: &NewBanner) -> BannerResult<i64> {
        let id = self.next_id().await?;
        let record = BannerRecord::new(id, banner, bson::DateTime::now())?;

        self.banners
            .insert_one(&record)
            .await
            .context("failed to insert banner")?;

        debug!(id, "Inserted banner into MongoDB");
        Ok(id)
    }

    async fn list(&self, query: &BannerQuery) -> BannerResult<Vec<Banner>> {
        // A Mongo limit of 0 means "no limit".
        if query.limit == Some(0) {
            return Ok(Vec::new());
        }

        let mut filter = FilterBuilder::new();
        if let Some(feature_id) = query.feature_id {
            filter = filter.eq(fields::FEATURE_ID, feature_id);
        }
        if let Some(tag_id) = query.tag_id {
            filter = filter.contains(fields::TAG_IDS, tag_id);
        }

        let options = FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .skip(query.offset)
            .limit(query.limit.map(|limit| i64::try_from(limit).unwrap_or(i64::MAX)))
            .build();

        let mut cursor = self
            .banners
            .find(filter.build())
            .with_options(options)
            .await
            .context("failed to list banners")?;

        let mut banners = Vec::new();
        while let Some(record) = cursor.next().await {
            banners.push(record.context("failed to decode banner")?.into_banner()?);
        }
        Ok(banners)
    }

    async fn delete(&self, id: i64) -> BannerResult<Vec<BannerKey>> {
        let record = self
            .banners
            .find_one_and_delete(FilterBuilder::new().eq(fields::ID, id).build())
            .await
            .context("failed to delete banner")?
            .ok_or(BannerError::NotFound)?;

        debug!(id, "Deleted banner from MongoDB");
        Ok(record.into_banner()?.keys())
    }
}
