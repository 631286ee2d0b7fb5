use super::normalize::normalize;
use super::Record;
use crate::storage::{RecordStore, StoreResult};
use chrono::Utc;

/// Changes made by one dedup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// `(stored_key, normalized_key)` pairs that were folded together.
    pub merged: Vec<(String, String)>,
    /// Stored keys that no longer pass normalization; left untouched.
    pub unresolvable: Vec<String>,
}

impl DedupReport {
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}

/// Folds every record stored under an unnormalized key into the record at its
/// normalized key, then deletes the unnormalized key. Running it again on the
/// result changes nothing.
pub fn dedup_records(store: &RecordStore) -> StoreResult<DedupReport> {
    let mut report = DedupReport::default();
    for record in store.get_all()? {
        let Some(normalized) = normalize(&record.key) else {
            report.unresolvable.push(record.key.clone());
            continue;
        };
        if normalized == record.key {
            continue;
        }
        let source = record.clone();
        store.update_with(&normalized, &mut |existing| match existing {
            Some(target) => merge_duplicates(target, source.clone()),
            None => Record {
                key: normalized.clone(),
                ..source.clone()
            },
        })?;
        store.delete(&source.key)?;
        report.merged.push((source.key, normalized));
    }
    Ok(report)
}

/// Merges two records for the same identity. The one that already went
/// through enrichment is primary; on a tie the record already at the
/// normalized key wins. Fields the primary lacks are filled from the other.
fn merge_duplicates(target: Record, source: Record) -> Record {
    let key = target.key.clone();
    let (mut primary, secondary) = if !target.has_been_processed() && source.has_been_processed() {
        (source, target)
    } else {
        (target, source)
    };
    primary.key = key;
    primary.fields.fill_missing_from(&secondary.fields);
    if primary.processed_at.is_none() {
        primary.processed_at = secondary.processed_at;
    }
    primary.first_seen_at = primary.first_seen_at.min(secondary.first_seen_at);
    primary.last_updated = Utc::now();
    primary
}
