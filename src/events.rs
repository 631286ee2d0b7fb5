use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Type of activity events that can be logged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StoreOpened,
    BackendDowngraded,
    BackendPreferenceReset,
    DuplicatesMerged,
    SightingsCollected,
    QueueStarted,
    QueuePassStarted,
    QueueCompleted,
    QueueStopped,
    QueueCorruption,
    EnrichmentApplied,
    EnrichmentFailed,
    EnrichmentIgnored,
    DecisionRecorded,
    SnapshotExported,
    SnapshotImported,
}

/// General-purpose activity event stored as JSONL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

/// Append-only `events.jsonl` for a workspace.
#[derive(Debug, Clone)]
pub struct EventLog {
    events_path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            events_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.events_path
    }

    pub fn append_event(&self, event: &ActivityEvent) -> Result<()> {
        if let Some(parent) = self.events_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)?;
        file.write_all(serde_json::to_string(event)?.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    pub fn load_events(&self) -> Result<Vec<ActivityEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(&self.events_path)?;
        let mut events = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            let event: ActivityEvent = serde_json::from_str(line)?;
            events.push(event);
        }
        Ok(events)
    }

    pub fn events_of_type(&self, event_type: EventType) -> Result<Vec<ActivityEvent>> {
        Ok(self
            .load_events()?
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect())
    }
}

/// Append a simple activity event.
pub fn log_event(log: &EventLog, event_type: EventType, details: serde_json::Value) -> Result<()> {
    tracing::debug!(?event_type, %details, "activity");
    let event = ActivityEvent {
        event_id: Uuid::new_v4(),
        event_type,
        timestamp: Utc::now(),
        details,
    };
    log.append_event(&event)
}

/// Optional-log variant used by components that can run without a workspace.
pub(crate) fn log_to(log: Option<&EventLog>, event_type: EventType, details: serde_json::Value) {
    if let Some(log) = log {
        if let Err(err) = log_event(log, event_type, details) {
            tracing::warn!(error = %err, ?event_type, "failed to append activity event");
        }
    }
}
