use crate::persist::write_json_atomic;
use crate::records::{normalize, Classifier, Record, Tier};
use crate::review::{Decision, PreferenceEntry, PreferenceIndex};
use crate::storage::{RecordStore, StoreError};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot format version {found} is not supported (expected {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("snapshot digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch { recorded: String, computed: String },
    #[error("snapshot record under {slot:?} carries key {key:?}")]
    KeyMismatch { slot: String, key: String },
    #[error("failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total: usize,
    pub tiers: BTreeMap<String, usize>,
    pub decisions: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub exported_at: DateTime<Utc>,
    /// Keyed by record key, in store iteration order.
    pub records: IndexMap<String, Record>,
    pub preferences: Vec<PreferenceEntry>,
    pub stats: SnapshotStats,
    pub digest: String,
}

impl Snapshot {
    pub fn compute_digest(&self) -> Result<String, SnapshotError> {
        content_digest(&self.records, &self.preferences)
    }

    /// Checks version, digest, and that every record sits under its own key.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.format_version,
                supported: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let computed = self.compute_digest()?;
        if computed != self.digest {
            return Err(SnapshotError::DigestMismatch {
                recorded: self.digest.clone(),
                computed,
            });
        }
        for (slot, record) in &self.records {
            if *slot != record.key {
                return Err(SnapshotError::KeyMismatch {
                    slot: slot.clone(),
                    key: record.key.clone(),
                });
            }
        }
        Ok(())
    }
}

fn content_digest(
    records: &IndexMap<String, Record>,
    preferences: &[PreferenceEntry],
) -> Result<String, SnapshotError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(records)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(preferences)?);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Builds a snapshot of the whole store and preference index.
pub fn export_snapshot(
    store: &RecordStore,
    preferences: &PreferenceIndex,
    classifier: &Classifier,
) -> Result<Snapshot, SnapshotError> {
    let records: IndexMap<String, Record> = store
        .get_all()?
        .into_iter()
        .map(|record| (record.key.clone(), record))
        .collect();
    let entries = preferences.entries();

    let mut tiers: BTreeMap<String, usize> = Tier::ALL
        .iter()
        .map(|tier| (tier.as_str().to_string(), 0))
        .collect();
    for record in records.values() {
        *tiers
            .entry(classifier.tier(record).as_str().to_string())
            .or_insert(0) += 1;
    }
    let mut decisions: BTreeMap<String, usize> = BTreeMap::new();
    for record in records.values() {
        *decisions
            .entry(preferences.get(&record.key).as_str().to_string())
            .or_insert(0) += 1;
    }

    let digest = content_digest(&records, &entries)?;
    Ok(Snapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        exported_at: Utc::now(),
        stats: SnapshotStats {
            total: records.len(),
            tiers,
            decisions,
        },
        records,
        preferences: entries,
        digest,
    })
}

pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    write_json_atomic(path, snapshot)
        .with_context(|| format!("Failed to write snapshot {:?}", path))
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub records: usize,
    pub preferences: usize,
    /// Keys that failed normalization and were left out.
    pub skipped: Vec<String>,
}

/// Writes a verified snapshot into the store and preference index. Records
/// are written wholesale, timestamps included, in the order they were
/// exported.
pub fn import_snapshot(
    store: &RecordStore,
    preferences: &mut PreferenceIndex,
    snapshot: &Snapshot,
) -> Result<ImportSummary> {
    snapshot.verify()?;
    let mut summary = ImportSummary::default();
    for (key, record) in &snapshot.records {
        if normalize(key).as_deref() != Some(key.as_str()) {
            summary.skipped.push(key.clone());
            continue;
        }
        store
            .import_record(record)
            .with_context(|| format!("Failed to import record {key}"))?;
        summary.records += 1;
    }
    let entries: Vec<PreferenceEntry> = snapshot
        .preferences
        .iter()
        .filter(|entry| entry.decision != Decision::None)
        .filter(|entry| normalize(&entry.key).as_deref() == Some(entry.key.as_str()))
        .cloned()
        .collect();
    summary.preferences = entries.len();
    preferences.replace_entries(entries)?;
    Ok(summary)
}
