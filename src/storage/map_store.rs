use super::{BackendKind, RecordBackend, StoreError, StoreResult};
use crate::persist::{read_json_opt, write_json_atomic};
use crate::records::{Record, RecordStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct MapDocument {
    #[serde(default)]
    records: Vec<Record>,
}

/// Fallback backend: every record in one JSON document, kept in memory and
/// rewritten atomically on each mutation.
pub struct MapBackend {
    path: Option<PathBuf>,
    records: Mutex<Vec<Record>>,
}

impl MapBackend {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let document: MapDocument = read_json_opt(path)?.unwrap_or_default();
        Ok(Self {
            path: Some(path.to_path_buf()),
            records: Mutex::new(document.records),
        })
    }

    /// Map backend that never touches disk.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Vec<Record>>> {
        self.records.lock().map_err(|_| StoreError::Poisoned)
    }

    fn persist(&self, records: &[Record]) -> StoreResult<()> {
        if let Some(path) = &self.path {
            #[derive(Serialize)]
            struct Borrowed<'a> {
                records: &'a [Record],
            }
            write_json_atomic(path, &Borrowed { records })?;
        }
        Ok(())
    }
}

impl RecordBackend for MapBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn load(&self, key: &str) -> StoreResult<Option<Record>> {
        Ok(self.lock()?.iter().find(|r| r.key == key).cloned())
    }

    fn load_all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.lock()?.clone())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<Record>) -> Record,
    ) -> StoreResult<Record> {
        let mut records = self.lock()?;
        let position = records.iter().position(|r| r.key == key);
        let mut record = apply(position.map(|idx| records[idx].clone()));
        record.key = key.to_string();
        let previous = match position {
            Some(idx) => Some(std::mem::replace(&mut records[idx], record.clone())),
            None => {
                records.push(record.clone());
                None
            }
        };
        if let Err(err) = self.persist(&records) {
            match (position, previous) {
                (Some(idx), Some(previous)) => records[idx] = previous,
                _ => {
                    records.pop();
                }
            }
            return Err(err);
        }
        Ok(record)
    }

    fn remove(&self, key: &str) -> StoreResult<bool> {
        let mut records = self.lock()?;
        let Some(idx) = records.iter().position(|r| r.key == key) else {
            return Ok(false);
        };
        let removed = records.remove(idx);
        if let Err(err) = self.persist(&records) {
            records.insert(idx, removed);
            return Err(err);
        }
        Ok(true)
    }

    fn keys_with_status(&self, status: RecordStatus) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.key.clone())
            .collect())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }
}
