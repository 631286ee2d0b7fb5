use super::error::{CollectionIssue, CollectionIssueReason};
use super::CollectionSummary;
use crate::config::PageSettings;
use crate::events::{log_to, EventLog, EventType};
use crate::records::{normalize, ProfileFields, Record};
use crate::storage::{RecordStore, StoreResult};
use anyhow::Result;
use chrono::Utc;
use serde_json::json;

/// One account seen on a list page, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSighting {
    pub raw_key: String,
    pub fields: ProfileFields,
}

impl ProfileSighting {
    pub fn new(raw_key: impl Into<String>) -> Self {
        Self {
            raw_key: raw_key.into(),
            fields: ProfileFields::default(),
        }
    }

    pub fn with_fields(mut self, fields: ProfileFields) -> Self {
        self.fields = fields;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SightingOutcome {
    Saved { key: String, created: bool },
    Buffered { key: String },
    Rejected,
}

/// Turns sightings into basic records. With `auto_save` off, sightings are
/// held until `flush`.
pub struct Collector<'a> {
    store: &'a RecordStore,
    auto_save: bool,
    buffer: Vec<(String, ProfileFields)>,
    log: Option<&'a EventLog>,
}

impl<'a> Collector<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self {
            store,
            auto_save: true,
            buffer: Vec::new(),
            log: None,
        }
    }

    pub fn with_page_settings(mut self, settings: &PageSettings) -> Self {
        self.auto_save = settings.auto_save;
        self
    }

    pub fn with_event_log(mut self, log: &'a EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn record(&mut self, sighting: &ProfileSighting) -> StoreResult<SightingOutcome> {
        let Some(key) = normalize(&sighting.raw_key) else {
            return Ok(SightingOutcome::Rejected);
        };
        if !self.auto_save {
            match self.buffer.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, fields)) => fields.merge_from(&sighting.fields),
                None => self.buffer.push((key.clone(), sighting.fields.clone())),
            }
            return Ok(SightingOutcome::Buffered { key });
        }
        let created = self.save(&key, &sighting.fields)?;
        Ok(SightingOutcome::Saved { key, created })
    }

    /// Records a batch of sightings. Store failures are reported per
    /// sighting and do not stop the batch.
    pub fn collect<'s, I>(&mut self, sightings: I) -> Result<CollectionSummary>
    where
        I: IntoIterator<Item = &'s ProfileSighting>,
    {
        let mut summary = CollectionSummary::default();
        for sighting in sightings {
            summary.sightings += 1;
            match self.record(sighting) {
                Ok(SightingOutcome::Saved { created, .. }) => {
                    summary.accepted += 1;
                    if created {
                        summary.created += 1;
                    }
                }
                Ok(SightingOutcome::Buffered { .. }) => {
                    summary.accepted += 1;
                    summary.buffered += 1;
                }
                Ok(SightingOutcome::Rejected) => {
                    summary.rejected += 1;
                    summary.issues.push(CollectionIssue::new(
                        sighting.raw_key.clone(),
                        CollectionIssueReason::InvalidKey,
                        "Not a valid account key",
                    ));
                }
                Err(err) => {
                    tracing::warn!(raw_key = %sighting.raw_key, error = %err, "failed to save sighting");
                    summary.issues.push(CollectionIssue::new(
                        sighting.raw_key.clone(),
                        CollectionIssueReason::StoreFailure,
                        err.to_string(),
                    ));
                }
            }
        }
        log_to(
            self.log,
            EventType::SightingsCollected,
            json!({
                "sightings": summary.sightings,
                "accepted": summary.accepted,
                "created": summary.created,
                "buffered": summary.buffered,
                "rejected": summary.rejected,
            }),
        );
        Ok(summary)
    }

    /// Writes buffered sightings. Entries that fail stay buffered.
    pub fn flush(&mut self) -> Result<CollectionSummary> {
        let mut summary = CollectionSummary::default();
        let pending = std::mem::take(&mut self.buffer);
        for (key, fields) in pending {
            summary.sightings += 1;
            match self.save(&key, &fields) {
                Ok(created) => {
                    summary.accepted += 1;
                    if created {
                        summary.created += 1;
                    }
                }
                Err(err) => {
                    summary.issues.push(CollectionIssue::new(
                        key.clone(),
                        CollectionIssueReason::StoreFailure,
                        err.to_string(),
                    ));
                    self.buffer.push((key, fields));
                }
            }
        }
        if summary.sightings > 0 {
            log_to(
                self.log,
                EventType::SightingsCollected,
                json!({
                    "flushed": summary.accepted,
                    "created": summary.created,
                    "failed": summary.issues.len(),
                }),
            );
        }
        Ok(summary)
    }

    fn save(&self, key: &str, fields: &ProfileFields) -> StoreResult<bool> {
        let mut created = false;
        self.store.update_with(key, &mut |existing| {
            created = existing.is_none();
            let mut record = existing.unwrap_or_else(|| Record::new(key));
            record.fields.merge_from(fields);
            record.last_updated = Utc::now();
            record
        })?;
        Ok(created)
    }
}
