pub mod classify;
pub mod dedup;
pub mod normalize;

pub use classify::{classify, Classification, Classifier, Tier, DEFAULT_MAX_ATTEMPTS};
pub use dedup::{dedup_records, DedupReport};
pub use normalize::{normalize, MAX_KEY_LEN, RESERVED_KEYS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Enrichment status explicitly written by the enrichment step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Unset,
    Completed,
    Inaccessible,
    Private,
    NoData,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Unset => "unset",
            RecordStatus::Completed => "completed",
            RecordStatus::Inaccessible => "inaccessible",
            RecordStatus::Private => "private",
            RecordStatus::NoData => "no_data",
            RecordStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unset" => Some(RecordStatus::Unset),
            "completed" => Some(RecordStatus::Completed),
            "inaccessible" => Some(RecordStatus::Inaccessible),
            "private" => Some(RecordStatus::Private),
            "no_data" => Some(RecordStatus::NoData),
            "error" => Some(RecordStatus::Error),
            _ => None,
        }
    }
}

/// Reference to a single post captured during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRef {
    pub id: String,
    pub shortcode: String,
    pub url: String,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub like_count: Option<i64>,
    #[serde(default)]
    pub comment_count: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Extracted profile attributes. Every field is optional so the same type
/// doubles as a partial update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biography: Option<String>,
    /// `-1` marks "enrichment ran and found nothing".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_posts: Option<Vec<PostRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_business: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ProfileFields {
    /// Overwrites every field that `other` carries. `recent_posts` is replaced
    /// as a whole list, never merged item by item.
    pub fn merge_from(&mut self, other: &ProfileFields) {
        fn take<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
            if let Some(value) = incoming {
                *slot = Some(value.clone());
            }
        }
        take(&mut self.display_name, &other.display_name);
        take(&mut self.biography, &other.biography);
        take(&mut self.follower_count, &other.follower_count);
        take(&mut self.following_count, &other.following_count);
        take(&mut self.post_count, &other.post_count);
        take(&mut self.recent_posts, &other.recent_posts);
        take(&mut self.profile_image_ref, &other.profile_image_ref);
        take(&mut self.external_url, &other.external_url);
        take(&mut self.is_verified, &other.is_verified);
        take(&mut self.is_private, &other.is_private);
        take(&mut self.is_business, &other.is_business);
        for (key, value) in &other.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }

    /// Fills only the fields this record is missing.
    pub fn fill_missing_from(&mut self, other: &ProfileFields) {
        let mut merged = other.clone();
        merged.merge_from(self);
        *self = merged;
    }

    pub fn is_empty(&self) -> bool {
        self == &ProfileFields::default()
    }

    pub fn has_recent_posts(&self) -> bool {
        self.recent_posts
            .as_ref()
            .map(|posts| !posts.is_empty())
            .unwrap_or(false)
    }
}

/// A profile record keyed by its normalized username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    #[serde(default)]
    pub fields: ProfileFields,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            fields: ProfileFields::default(),
            status: RecordStatus::Unset,
            attempt_count: 0,
            processed_at: None,
            first_seen_at: now,
            last_updated: now,
        }
    }

    /// Applies a partial update in place and refreshes `last_updated`.
    pub fn apply(&mut self, patch: &RecordPatch) {
        self.fields.merge_from(&patch.fields);
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempts) = patch.attempt_count {
            self.attempt_count = attempts;
        }
        if let Some(processed_at) = patch.processed_at {
            self.processed_at = Some(processed_at);
        }
        self.last_updated = Utc::now();
    }

    /// Whether enrichment has produced anything for this record yet.
    pub fn has_been_processed(&self) -> bool {
        self.status != RecordStatus::Unset || self.processed_at.is_some()
    }
}

/// Partial update passed to `RecordStore::upsert`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub fields: ProfileFields,
    pub status: Option<RecordStatus>,
    pub attempt_count: Option<u32>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn fields(fields: ProfileFields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_attempt_count(mut self, attempts: u32) -> Self {
        self.attempt_count = Some(attempts);
        self
    }

    pub fn processed_now(mut self) -> Self {
        self.processed_at = Some(Utc::now());
        self
    }
}
