use crate::persist::{read_json_opt, write_json_atomic};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A reviewer's decision about one record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    None,
    Accepted,
    Rejected,
    Contacted,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::Accepted => "accepted",
            Decision::Rejected => "rejected",
            Decision::Contacted => "contacted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreferenceEntry {
    pub key: String,
    pub decision: Decision,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounts {
    pub accepted: usize,
    pub rejected: usize,
    pub contacted: usize,
}

impl DecisionCounts {
    pub fn decided(&self) -> usize {
        self.accepted + self.rejected + self.contacted
    }
}

/// Outcome of [`PreferenceIndex::rename_keys`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameSummary {
    pub moved: usize,
    /// Decisions discarded because the destination already had one.
    pub dropped: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceDocument {
    #[serde(default)]
    entries: Vec<PreferenceEntry>,
}

/// Record key -> decision. Absent keys are undecided. When backed by a file,
/// every change is written through immediately.
#[derive(Debug, Clone, Default)]
pub struct PreferenceIndex {
    path: Option<PathBuf>,
    entries: BTreeMap<String, PreferenceEntry>,
}

impl PreferenceIndex {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let document: PreferenceDocument = read_json_opt(path)
            .with_context(|| format!("Failed to read preferences {:?}", path))?
            .unwrap_or_default();
        let entries = document
            .entries
            .into_iter()
            .filter(|entry| entry.decision != Decision::None)
            .map(|entry| (entry.key.clone(), entry))
            .collect();
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    pub fn get(&self, key: &str) -> Decision {
        self.entries
            .get(key)
            .map(|entry| entry.decision)
            .unwrap_or_default()
    }

    /// Records a decision; `Decision::None` clears the entry.
    pub fn set(&mut self, key: &str, decision: Decision) -> Result<()> {
        if decision == Decision::None {
            self.entries.remove(key);
        } else {
            self.entries.insert(
                key.to_string(),
                PreferenceEntry {
                    key: key.to_string(),
                    decision,
                    updated_at: Utc::now(),
                },
            );
        }
        self.save()
    }

    /// Entries sorted by key.
    pub fn entries(&self) -> Vec<PreferenceEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn counts(&self) -> DecisionCounts {
        let mut counts = DecisionCounts::default();
        for entry in self.entries.values() {
            match entry.decision {
                Decision::Accepted => counts.accepted += 1,
                Decision::Rejected => counts.rejected += 1,
                Decision::Contacted => counts.contacted += 1,
                Decision::None => {}
            }
        }
        counts
    }

    /// Moves decisions along with renamed record keys. An existing decision
    /// at the destination is kept.
    pub fn rename_keys(&mut self, renames: &[(String, String)]) -> Result<RenameSummary> {
        let mut summary = RenameSummary::default();
        for (from, to) in renames {
            if let Some(mut entry) = self.entries.remove(from) {
                if self.entries.contains_key(to) {
                    summary.dropped += 1;
                } else {
                    entry.key = to.clone();
                    self.entries.insert(to.clone(), entry);
                    summary.moved += 1;
                }
            }
        }
        if summary.moved + summary.dropped > 0 {
            self.save()?;
        }
        Ok(summary)
    }

    /// Overwrites entries for the given keys, timestamps included.
    pub fn replace_entries(&mut self, entries: impl IntoIterator<Item = PreferenceEntry>) -> Result<()> {
        for entry in entries {
            if entry.decision == Decision::None {
                self.entries.remove(&entry.key);
            } else {
                self.entries.insert(entry.key.clone(), entry);
            }
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let document = PreferenceDocument {
                entries: self.entries(),
            };
            write_json_atomic(path, &document)
                .with_context(|| format!("Failed to write preferences {:?}", path))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn decisions_persist_and_none_clears() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("preferences.json");
        let mut index = PreferenceIndex::load(&path).unwrap();
        index.set("alice", Decision::Accepted).unwrap();
        index.set("bob", Decision::Rejected).unwrap();
        index.set("carol", Decision::Contacted).unwrap();
        index.set("carol", Decision::None).unwrap();

        let reloaded = PreferenceIndex::load(&path).unwrap();
        assert_eq!(reloaded.get("alice"), Decision::Accepted);
        assert_eq!(reloaded.get("carol"), Decision::None);
        assert_eq!(
            reloaded.counts(),
            DecisionCounts {
                accepted: 1,
                rejected: 1,
                contacted: 0
            }
        );
    }

    #[test]
    fn renames_follow_dedup_without_clobbering() {
        let mut index = PreferenceIndex::in_memory();
        index.set("alice.", Decision::Accepted).unwrap();
        index.set("bob_", Decision::Rejected).unwrap();
        index.set("bob", Decision::Contacted).unwrap();
        let summary = index
            .rename_keys(&[
                ("alice.".into(), "alice".into()),
                ("bob_".into(), "bob".into()),
            ])
            .unwrap();
        assert_eq!(summary, RenameSummary { moved: 1, dropped: 1 });
        assert_eq!(index.get("alice"), Decision::Accepted);
        assert_eq!(index.get("bob"), Decision::Contacted);
        assert_eq!(index.entries().len(), 2);
    }
}
