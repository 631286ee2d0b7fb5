//! Durable enrichment queue.
//!
//! The worker is assumed to die after every dispatch, so nothing lives in
//! memory between calls: each `step()` reloads the slot, makes exactly one
//! transition, and writes the slot back before handing a key to the
//! extractor.

use super::{apply_extraction, ApplyOutcome, Extraction, IgnoreReason, PostPolicy};
use crate::config::QueueSettings;
use crate::events::{log_to, EventLog, EventType};
use crate::persist::{remove_if_exists, write_json_atomic};
use crate::records::{Classifier, Record, RecordStatus};
use crate::storage::RecordStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Idle,
    Processing,
}

/// Persisted queue run. `cursor` indexes the next item to look at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueState {
    pub run_id: Uuid,
    pub items: Vec<String>,
    pub cursor: usize,
    pub status: QueueStatus,
    /// 1-based sweep number; later passes revisit items that still need work.
    #[serde(default = "first_pass")]
    pub pass: u32,
    /// Times each key was handed to the extractor during this run.
    #[serde(default)]
    pub dispatch_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub last_dispatched: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const fn first_pass() -> u32 {
    1
}

impl QueueState {
    fn new(items: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            items,
            cursor: 0,
            status: QueueStatus::Processing,
            pass: first_pass(),
            dispatch_counts: BTreeMap::new(),
            skipped: 0,
            last_dispatched: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.cursor)
    }

    pub fn total_dispatched(&self) -> u64 {
        self.dispatch_counts.values().map(|count| u64::from(*count)).sum()
    }

    fn dispatches_of(&self, key: &str) -> u32 {
        self.dispatch_counts.get(key).copied().unwrap_or(0)
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.cursor > self.items.len() {
            return Err(format!(
                "cursor {} beyond {} items",
                self.cursor,
                self.items.len()
            ));
        }
        Ok(())
    }
}

/// What the slot held when it was read.
#[derive(Debug)]
pub enum SlotContents {
    Empty,
    Ready(QueueState),
    Corrupt(String),
}

/// The single named slot the queue state lives in, overwritten wholesale.
#[derive(Debug, Clone)]
pub struct QueueSlot {
    path: PathBuf,
}

impl QueueSlot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<SlotContents> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SlotContents::Empty),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read queue slot {:?}", self.path))
            }
        };
        let state: QueueState = match serde_json::from_slice(&data) {
            Ok(state) => state,
            Err(err) => return Ok(SlotContents::Corrupt(err.to_string())),
        };
        Ok(match state.check() {
            Ok(()) => SlotContents::Ready(state),
            Err(reason) => SlotContents::Corrupt(reason),
        })
    }

    /// The persisted state, if it is readable and valid.
    pub fn load(&self) -> Result<Option<QueueState>> {
        Ok(match self.read()? {
            SlotContents::Ready(state) => Some(state),
            SlotContents::Empty | SlotContents::Corrupt(_) => None,
        })
    }

    pub fn save(&self, state: &QueueState) -> Result<()> {
        write_json_atomic(&self.path, state)
            .with_context(|| format!("Failed to write queue slot {:?}", self.path))
    }

    pub fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
            .with_context(|| format!("Failed to clear queue slot {:?}", self.path))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue run {run_id} is already processing ({remaining} items left)")]
    AlreadyProcessing { run_id: Uuid, remaining: usize },
}

/// Result of one `step()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No run in progress.
    Idle,
    /// `key` was handed out; the caller must run the extractor for it.
    Dispatched {
        key: String,
        position: usize,
        total: usize,
        pass: u32,
    },
    /// The run finished (or its state was unusable) and the slot is cleared.
    Completed {
        run_id: Option<Uuid>,
        passes: u32,
        dispatched: u64,
        skipped: u64,
        corrupted: bool,
    },
}

pub struct WorkQueue<'a> {
    store: &'a RecordStore,
    slot: QueueSlot,
    classifier: Classifier,
    settings: QueueSettings,
    posts: PostPolicy,
    log: Option<&'a EventLog>,
}

impl<'a> WorkQueue<'a> {
    pub fn new(store: &'a RecordStore, slot: QueueSlot, settings: QueueSettings) -> Self {
        Self {
            store,
            slot,
            classifier: Classifier::new(settings.max_attempts),
            settings,
            posts: PostPolicy::default(),
            log: None,
        }
    }

    pub fn with_event_log(mut self, log: &'a EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_post_policy(mut self, posts: PostPolicy) -> Self {
        self.posts = posts;
        self
    }

    pub fn classifier(&self) -> Classifier {
        self.classifier
    }

    pub fn state(&self) -> Result<Option<QueueState>> {
        self.slot.load()
    }

    pub fn is_processing(&self) -> Result<bool> {
        Ok(matches!(
            self.slot.load()?,
            Some(QueueState {
                status: QueueStatus::Processing,
                ..
            })
        ))
    }

    /// Begins a run over `items` (duplicates dropped, order kept).
    pub fn start<I, S>(&self, items: I) -> Result<QueueState>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(existing) = self.slot.load()? {
            if existing.status == QueueStatus::Processing {
                return Err(QueueError::AlreadyProcessing {
                    run_id: existing.run_id,
                    remaining: existing.remaining(),
                }
                .into());
            }
        }
        let mut seen = HashSet::new();
        let items: Vec<String> = items
            .into_iter()
            .map(Into::into)
            .filter(|key| seen.insert(key.clone()))
            .collect();
        let state = QueueState::new(items);
        self.slot.save(&state)?;
        tracing::info!(run_id = %state.run_id, items = state.items.len(), "enrichment queue started");
        log_to(
            self.log,
            EventType::QueueStarted,
            json!({ "run_id": state.run_id, "items": state.items.len() }),
        );
        Ok(state)
    }

    /// Starts a run over every stored record that still needs enrichment.
    pub fn start_pending(&self) -> Result<QueueState> {
        let keys: Vec<String> = self
            .store
            .get_all()?
            .into_iter()
            .filter(|record| self.classifier.needs_enrichment(record))
            .map(|record| record.key)
            .collect();
        self.start(keys)
    }

    /// Advances the run by one transition. Safe to call after any restart.
    pub fn step(&self) -> Result<StepOutcome> {
        let mut state = match self.slot.read()? {
            SlotContents::Empty => return Ok(StepOutcome::Idle),
            SlotContents::Corrupt(reason) => return self.recover_from_corruption(&reason),
            SlotContents::Ready(state) => state,
        };
        if state.status != QueueStatus::Processing {
            return Ok(StepOutcome::Idle);
        }

        loop {
            if state.cursor >= state.items.len() {
                if self.begin_retry_pass(&mut state)? {
                    continue;
                }
                return self.finish(state);
            }

            let key = state.items[state.cursor].clone();
            if !self.should_dispatch(&state, &key)? {
                state.cursor += 1;
                state.skipped += 1;
                state.updated_at = Utc::now();
                self.slot.save(&state)?;
                continue;
            }

            state.cursor += 1;
            *state.dispatch_counts.entry(key.clone()).or_insert(0) += 1;
            state.last_dispatched = Some(key.clone());
            state.updated_at = Utc::now();
            self.slot.save(&state)?;
            tracing::debug!(key = %key, cursor = state.cursor, pass = state.pass, "dispatching enrichment");
            return Ok(StepOutcome::Dispatched {
                key,
                position: state.cursor,
                total: state.items.len(),
                pass: state.pass,
            });
        }
    }

    /// Extractor callback. Ignored unless the key belongs to a processing run
    /// and its record still needs enrichment.
    pub fn complete(&self, key: &str, extraction: Extraction) -> Result<ApplyOutcome> {
        let active = match self.slot.load()? {
            Some(state) => {
                state.status == QueueStatus::Processing && state.items.iter().any(|item| item == key)
            }
            None => false,
        };
        let outcome = if active {
            apply_extraction(self.store, &self.classifier, key, extraction, self.posts)?
        } else {
            ApplyOutcome::Ignored(IgnoreReason::QueueNotProcessing)
        };
        match &outcome {
            ApplyOutcome::Applied { record, failed } => {
                let event = if *failed {
                    EventType::EnrichmentFailed
                } else {
                    EventType::EnrichmentApplied
                };
                log_to(
                    self.log,
                    event,
                    json!({
                        "key": key,
                        "status": record.status.as_str(),
                        "attempt_count": record.attempt_count,
                    }),
                );
            }
            ApplyOutcome::Ignored(reason) => {
                tracing::debug!(key, ?reason, "ignoring enrichment result");
                log_to(
                    self.log,
                    EventType::EnrichmentIgnored,
                    json!({ "key": key, "reason": format!("{:?}", reason) }),
                );
            }
        }
        Ok(outcome)
    }

    /// Clears any run. In-flight results arriving later are ignored.
    pub fn stop(&self) -> Result<bool> {
        let previous = self.slot.load()?;
        self.slot.clear()?;
        match previous {
            Some(state) if state.status == QueueStatus::Processing => {
                log_to(
                    self.log,
                    EventType::QueueStopped,
                    json!({ "run_id": state.run_id, "cursor": state.cursor }),
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn should_dispatch(&self, state: &QueueState, key: &str) -> Result<bool> {
        if state.dispatches_of(key) >= self.classifier.max_attempts() {
            return Ok(false);
        }
        let record = self.store.get(key)?.unwrap_or_else(|| Record::new(key));
        Ok(self.classifier.needs_enrichment(&record))
    }

    /// Restarts the cursor over items that failed and can still be retried.
    fn begin_retry_pass(&self, state: &mut QueueState) -> Result<bool> {
        if !self.settings.retry_failed_items {
            return Ok(false);
        }
        let mut retry = Vec::new();
        for key in &state.items {
            if state.dispatches_of(key) == 0 {
                continue;
            }
            if self.should_dispatch(state, key)? {
                retry.push(key.clone());
            }
        }
        if retry.is_empty() {
            return Ok(false);
        }
        state.items = retry;
        state.cursor = 0;
        state.pass += 1;
        state.updated_at = Utc::now();
        self.slot.save(state)?;
        log_to(
            self.log,
            EventType::QueuePassStarted,
            json!({ "run_id": state.run_id, "pass": state.pass, "items": state.items.len() }),
        );
        Ok(true)
    }

    fn finish(&self, state: QueueState) -> Result<StepOutcome> {
        // Count before clearing so a store error leaves the run resumable.
        let mut failed = 0;
        for key in state.dispatch_counts.keys() {
            if let Some(record) = self.store.get(key)? {
                if record.status == RecordStatus::Error {
                    failed += 1;
                }
            }
        }
        self.slot.clear()?;
        tracing::info!(
            run_id = %state.run_id,
            passes = state.pass,
            dispatched = state.total_dispatched(),
            failed,
            "enrichment queue completed"
        );
        log_to(
            self.log,
            EventType::QueueCompleted,
            json!({
                "run_id": state.run_id,
                "passes": state.pass,
                "dispatched": state.total_dispatched(),
                "skipped": state.skipped,
                "failed": failed,
            }),
        );
        Ok(StepOutcome::Completed {
            run_id: Some(state.run_id),
            passes: state.pass,
            dispatched: state.total_dispatched(),
            skipped: state.skipped,
            corrupted: false,
        })
    }

    fn recover_from_corruption(&self, reason: &str) -> Result<StepOutcome> {
        tracing::warn!(reason, path = ?self.slot.path(), "queue state unusable, clearing");
        self.slot.clear()?;
        log_to(
            self.log,
            EventType::QueueCorruption,
            json!({ "reason": reason }),
        );
        Ok(StepOutcome::Completed {
            run_id: None,
            passes: 0,
            dispatched: 0,
            skipped: 0,
            corrupted: true,
        })
    }
}
