//! Record persistence.
//!
//! `RecordStore` fronts one of two interchangeable backends:
//!   * `SqliteBackend`: the structured store, schema-versioned with indexed
//!     secondary lookups.
//!   * `MapBackend`: a JSON map file used when the structured store cannot be
//!     acquired in time.
//!
//! Every mutation goes through a per-key read-modify-write on the backend, so
//! readers never observe a half-merged record.

mod error;
pub mod map_store;
mod migrations;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use map_store::MapBackend;
pub use migrations::SCHEMA_VERSION;
pub use sqlite::SqliteBackend;

use crate::records::{Record, RecordPatch, RecordStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Which backend a store ended up on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Structured,
    Fallback,
}

/// Persistence contract shared by both backends.
pub trait RecordBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn load(&self, key: &str) -> StoreResult<Option<Record>>;

    /// All records in insertion order.
    fn load_all(&self) -> StoreResult<Vec<Record>>;

    /// Atomically reads the current record (if any), lets `apply` produce the
    /// replacement, and writes it back.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Record>) -> Record,
    ) -> StoreResult<Record>;

    /// Returns whether a record was removed.
    fn remove(&self, key: &str) -> StoreResult<bool>;

    fn keys_with_status(&self, status: RecordStatus) -> StoreResult<Vec<String>>;

    fn count(&self) -> StoreResult<usize>;
}

/// Where the two backends keep their data.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub structured_path: PathBuf,
    pub fallback_path: PathBuf,
}

/// Outcome of acquiring a store: the store plus the structured-backend
/// failure that forced a fallback, if any.
pub struct StoreInit {
    pub store: RecordStore,
    pub downgrade: Option<StoreError>,
}

pub struct RecordStore {
    backend: Box<dyn RecordBackend>,
}

impl RecordStore {
    pub fn with_backend(backend: Box<dyn RecordBackend>) -> Self {
        Self { backend }
    }

    /// Acquires the structured backend within `timeout`, falling back to the
    /// map file on timeout, lock conflict, or any open/migration failure.
    /// With `skip_structured` the structured backend is not attempted.
    pub fn init(location: &StoreLocation, timeout: Duration, skip_structured: bool) -> StoreResult<StoreInit> {
        if skip_structured {
            let backend = MapBackend::open(&location.fallback_path)?;
            return Ok(StoreInit {
                store: Self::with_backend(Box::new(backend)),
                downgrade: None,
            });
        }
        match open_structured_within(&location.structured_path, timeout) {
            Ok(backend) => Ok(StoreInit {
                store: Self::with_backend(Box::new(backend)),
                downgrade: None,
            }),
            Err(err) if err.warrants_fallback() => {
                tracing::warn!(error = %err, "structured record store unavailable, using fallback");
                let backend = MapBackend::open(&location.fallback_path)?;
                Ok(StoreInit {
                    store: Self::with_backend(Box::new(backend)),
                    downgrade: Some(err),
                })
            }
            Err(err) => Err(err),
        }
    }

    pub fn in_memory() -> StoreResult<Self> {
        Ok(Self::with_backend(Box::new(SqliteBackend::open_in_memory()?)))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Field-level merge. Creates the record on first sighting.
    pub fn upsert(&self, key: &str, patch: &RecordPatch) -> StoreResult<Record> {
        self.backend.update(key, &mut |existing| {
            let mut record = existing.unwrap_or_else(|| Record::new(key));
            record.apply(patch);
            record
        })
    }

    /// Writes a complete record as-is, timestamps included.
    pub fn import_record(&self, record: &Record) -> StoreResult<Record> {
        self.backend.update(&record.key, &mut |_| record.clone())
    }

    /// Read-modify-write with caller-supplied merge logic.
    pub fn update_with(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Record>) -> Record,
    ) -> StoreResult<Record> {
        self.backend.update(key, apply)
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<Record>> {
        self.backend.load(key)
    }

    pub fn get_all(&self) -> StoreResult<Vec<Record>> {
        self.backend.load_all()
    }

    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        self.backend.remove(key)
    }

    pub fn keys_with_status(&self, status: RecordStatus) -> StoreResult<Vec<String>> {
        self.backend.keys_with_status(status)
    }

    pub fn status_counts(&self) -> StoreResult<BTreeMap<&'static str, usize>> {
        let mut counts = BTreeMap::new();
        for record in self.get_all()? {
            *counts.entry(record.status.as_str()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub fn len(&self) -> StoreResult<usize> {
        self.backend.count()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Opens and migrates SQLite on a helper thread so a stuck open cannot hold
/// the caller past `timeout`.
fn open_structured_within(path: &Path, timeout: Duration) -> StoreResult<SqliteBackend> {
    let (tx, rx) = mpsc::channel();
    let path = path.to_path_buf();
    thread::Builder::new()
        .name("record-store-init".into())
        .spawn(move || {
            let _ = tx.send(SqliteBackend::open(&path, timeout));
        })?;
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(StoreError::BackendUnavailable(format!(
            "not ready within {} ms",
            timeout.as_millis()
        ))),
        Err(RecvTimeoutError::Disconnected) => Err(StoreError::BackendUnavailable(
            "initialization thread exited without a result".into(),
        )),
    }
}
