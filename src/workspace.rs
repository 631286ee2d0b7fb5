//! Workspace: the on-disk home of one profilebase installation.
//!
//! Layout under the root:
//!   config/config.toml
//!   data/records.sqlite3      structured backend
//!   data/records.json         fallback backend
//!   data/preferences.json
//!   data/queue_state.json
//!   data/events.jsonl
//!   exports/

use crate::config::{self, AppConfig, PageContext};
use crate::enrichment::{PostPolicy, QueueSlot, WorkQueue};
use crate::events::{log_event, EventLog, EventType};
use crate::export::{
    export_snapshot, import_snapshot, read_snapshot, write_snapshot, ImportSummary, Snapshot,
};
use crate::records::{dedup_records, Classifier, DedupReport};
use crate::review::PreferenceIndex;
use crate::storage::{BackendKind, RecordStore, StoreLocation};
use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub exports_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            exports_dir: root.join("exports"),
            root,
        }
    }

    pub fn store_location(&self) -> StoreLocation {
        StoreLocation {
            structured_path: self.data_dir.join("records.sqlite3"),
            fallback_path: self.data_dir.join("records.json"),
        }
    }

    pub fn preferences_file(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }

    pub fn queue_slot_file(&self) -> PathBuf {
        self.data_dir.join("queue_state.json")
    }

    pub fn events_file(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    fn ensure(&self) -> Result<()> {
        for dir in [&self.root, &self.data_dir, &self.exports_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create workspace directory {:?}", dir))?;
        }
        Ok(())
    }
}

/// A store handed out by `Workspace::open_record_store`, with what happened
/// while acquiring it.
pub struct OpenedStore {
    pub store: RecordStore,
    pub downgraded: bool,
    pub dedup: DedupReport,
}

pub struct Workspace {
    pub config: AppConfig,
    pub paths: WorkspacePaths,
    pub config_path: PathBuf,
}

impl Workspace {
    /// Opens the workspace at `PROFILEBASE_HOME` or the OS data directory.
    pub fn open() -> Result<Self> {
        Self::at(config::workspace_root()?)
    }

    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        paths.ensure()?;
        let config_path = config::config_file_path(&paths.root);
        let config = config::load_or_default(&config_path)?;
        Ok(Self {
            config,
            paths,
            config_path,
        })
    }

    pub fn save_config(&self) -> Result<()> {
        config::save(&self.config_path, &self.config)
    }

    pub fn event_log(&self) -> EventLog {
        EventLog::new(self.paths.events_file())
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.config.queue.max_attempts)
    }

    pub fn preferences(&self) -> Result<PreferenceIndex> {
        PreferenceIndex::load(&self.paths.preferences_file())
    }

    pub fn queue_slot(&self) -> QueueSlot {
        QueueSlot::new(self.paths.queue_slot_file())
    }

    /// Queue wired to this workspace's settings and slot.
    pub fn work_queue<'a>(&self, store: &'a RecordStore, log: &'a EventLog) -> WorkQueue<'a> {
        let posts = PostPolicy::from(self.config.pages.for_context(PageContext::Profile));
        WorkQueue::new(store, self.queue_slot(), self.config.queue.clone())
            .with_post_policy(posts)
            .with_event_log(log)
    }

    /// Acquires the record store, persisting a fallback decision if the
    /// structured backend could not be used, then folds duplicate keys.
    pub fn open_record_store(&mut self) -> Result<OpenedStore> {
        let log = self.event_log();
        let init = RecordStore::init(
            &self.paths.store_location(),
            self.config.storage.init_timeout(),
            self.config.storage.fallback_locked,
        )
        .context("Failed to open record store")?;

        let downgraded = init.downgrade.is_some();
        if let Some(reason) = &init.downgrade {
            self.config.storage.fallback_locked = true;
            self.save_config()?;
            log_event(
                &log,
                EventType::BackendDowngraded,
                json!({ "reason": reason.to_string() }),
            )?;
        }
        let store = init.store;
        log_event(
            &log,
            EventType::StoreOpened,
            json!({
                "backend": backend_label(store.backend_kind()),
                "fallback_locked": self.config.storage.fallback_locked,
            }),
        )?;

        let dedup = dedup_records(&store).context("Failed to merge duplicate records")?;
        if !dedup.is_empty() {
            let mut preferences = self.preferences()?;
            let renamed = preferences.rename_keys(&dedup.merged)?;
            log_event(
                &log,
                EventType::DuplicatesMerged,
                json!({
                    "merged": dedup.merged.len(),
                    "preferences_moved": renamed.moved,
                    "preferences_dropped": renamed.dropped,
                }),
            )?;
        }
        if !dedup.unresolvable.is_empty() {
            tracing::warn!(keys = ?dedup.unresolvable, "stored keys fail normalization and were left in place");
        }

        Ok(OpenedStore {
            store,
            downgraded,
            dedup,
        })
    }

    /// Forgets a persisted fallback decision so the next open tries the
    /// structured backend again. Returns whether anything changed.
    pub fn reset_backend_preference(&mut self) -> Result<bool> {
        if !self.config.storage.fallback_locked {
            return Ok(false);
        }
        self.config.storage.fallback_locked = false;
        self.save_config()?;
        log_event(
            &self.event_log(),
            EventType::BackendPreferenceReset,
            json!({}),
        )?;
        Ok(true)
    }

    /// Exports to `path`, or to a timestamped file under `exports/`.
    pub fn export_to(&self, store: &RecordStore, path: Option<&Path>) -> Result<(PathBuf, Snapshot)> {
        let preferences = self.preferences()?;
        let snapshot = export_snapshot(store, &preferences, &self.classifier())
            .context("Failed to build snapshot")?;
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.paths.exports_dir.join(format!(
                "snapshot-{}.json",
                snapshot.exported_at.format("%Y%m%dT%H%M%SZ")
            )),
        };
        write_snapshot(&path, &snapshot)?;
        log_event(
            &self.event_log(),
            EventType::SnapshotExported,
            json!({
                "path": path,
                "records": snapshot.stats.total,
                "digest": snapshot.digest,
            }),
        )?;
        Ok((path, snapshot))
    }

    pub fn import_from(&self, store: &RecordStore, path: &Path) -> Result<ImportSummary> {
        let snapshot =
            read_snapshot(path).with_context(|| format!("Failed to load snapshot {:?}", path))?;
        let mut preferences = self.preferences()?;
        let summary = import_snapshot(store, &mut preferences, &snapshot)?;
        log_event(
            &self.event_log(),
            EventType::SnapshotImported,
            json!({
                "path": path,
                "records": summary.records,
                "preferences": summary.preferences,
                "skipped": summary.skipped,
            }),
        )?;
        Ok(summary)
    }
}

pub fn backend_label(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Structured => "structured",
        BackendKind::Fallback => "fallback",
    }
}
