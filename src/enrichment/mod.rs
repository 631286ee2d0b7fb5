//! Enrichment: turning basic records into extended ones.
//!
//! The extractor that reads an external profile document is out of scope; it
//! is reached through the `Extractor` trait. This module owns what happens to
//! its results and the durable queue that feeds it keys.

pub mod driver;
pub mod queue;
pub mod status;

pub use driver::{DriverSummary, EnrichmentDriver};
pub use queue::{QueueError, QueueSlot, QueueState, QueueStatus, StepOutcome, WorkQueue};
pub use status::format_queue_status;

use crate::config::PageSettings;
use crate::records::{Classifier, ProfileFields, Record, RecordPatch, RecordStatus};
use crate::storage::{RecordStore, StoreResult};
use chrono::Utc;

/// Profile attributes as returned by an extractor; maps 1:1 onto record fields.
pub type RawProfile = ProfileFields;

/// Non-profile results an extractor can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    Inaccessible,
    Private,
    NoData,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Profile(RawProfile),
    Status(ExtractionStatus),
}

impl Extraction {
    pub fn failed(message: impl Into<String>) -> Self {
        Extraction::Status(ExtractionStatus::Error(message.into()))
    }
}

/// External collaborator that reads a profile for a key.
pub trait Extractor {
    fn extract(&mut self, key: &str) -> Extraction;
}

impl<F> Extractor for F
where
    F: FnMut(&str) -> Extraction,
{
    fn extract(&mut self, key: &str) -> Extraction {
        self(key)
    }
}

/// Raw document returned by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub url: String,
    pub body: String,
}

/// Transport used by concrete extractors to fetch pages.
pub trait DocumentFetcher {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_document(&mut self, url: &str) -> Result<RawDocument, Self::Error>;
}

/// How many recent posts to keep from an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostPolicy {
    pub collect_posts: bool,
    pub max_posts: usize,
}

impl Default for PostPolicy {
    fn default() -> Self {
        Self::from(&PageSettings::default())
    }
}

impl From<&PageSettings> for PostPolicy {
    fn from(settings: &PageSettings) -> Self {
        Self {
            collect_posts: settings.collect_posts,
            max_posts: settings.max_posts,
        }
    }
}

impl PostPolicy {
    fn apply(&self, fields: &mut ProfileFields) {
        if !self.collect_posts {
            fields.recent_posts = None;
        } else if let Some(posts) = fields.recent_posts.as_mut() {
            posts.truncate(self.max_posts);
        }
    }
}

/// Why an extraction result was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The record already left the basic tier (enriched some other way).
    AlreadyEnriched,
    /// The record used up its attempts.
    AttemptsExhausted,
    /// The queue was stopped or moved on before the result arrived.
    QueueNotProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { record: Record, failed: bool },
    Ignored(IgnoreReason),
}

/// Writes an extraction result into the store, unless the record no longer
/// needs enrichment.
///
/// Failures set `status = error` and bump `attempt_count`; every other
/// result stamps `processed_at`.
pub fn apply_extraction(
    store: &RecordStore,
    classifier: &Classifier,
    key: &str,
    extraction: Extraction,
    posts: PostPolicy,
) -> StoreResult<ApplyOutcome> {
    if let Some(existing) = store.get(key)? {
        if existing.attempt_count >= classifier.max_attempts() {
            return Ok(ApplyOutcome::Ignored(IgnoreReason::AttemptsExhausted));
        }
        if !classifier.needs_enrichment(&existing) {
            return Ok(ApplyOutcome::Ignored(IgnoreReason::AlreadyEnriched));
        }
    }

    let record = match extraction {
        Extraction::Profile(mut fields) => {
            posts.apply(&mut fields);
            store.upsert(
                key,
                &RecordPatch::fields(fields)
                    .with_status(RecordStatus::Completed)
                    .processed_now(),
            )?
        }
        Extraction::Status(ExtractionStatus::Inaccessible) => store.upsert(
            key,
            &RecordPatch::default()
                .with_status(RecordStatus::Inaccessible)
                .processed_now(),
        )?,
        Extraction::Status(ExtractionStatus::Private) => store.upsert(
            key,
            &RecordPatch::default()
                .with_status(RecordStatus::Private)
                .processed_now(),
        )?,
        Extraction::Status(ExtractionStatus::NoData) => store.upsert(
            key,
            &RecordPatch::fields(ProfileFields {
                follower_count: Some(-1),
                ..ProfileFields::default()
            })
            .with_status(RecordStatus::NoData)
            .processed_now(),
        )?,
        Extraction::Status(ExtractionStatus::Error(message)) => {
            tracing::debug!(key, %message, "enrichment attempt failed");
            let record = store.update_with(key, &mut |existing| {
                let mut record = existing.unwrap_or_else(|| Record::new(key));
                record.status = RecordStatus::Error;
                record.attempt_count = record.attempt_count.saturating_add(1);
                record.last_updated = Utc::now();
                record
            })?;
            return Ok(ApplyOutcome::Applied {
                record,
                failed: true,
            });
        }
    };
    Ok(ApplyOutcome::Applied {
        record,
        failed: false,
    })
}
