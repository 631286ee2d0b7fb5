use super::preferences::{Decision, PreferenceIndex};
use crate::records::{Classifier, Record, Tier};
use crate::storage::{RecordStore, StoreResult};
use serde::{Deserialize, Serialize};

/// Which slice of the store the reviewer is browsing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseMode {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Contacted,
    Search,
}

impl BrowseMode {
    pub const ALL: [BrowseMode; 5] = [
        BrowseMode::Pending,
        BrowseMode::Accepted,
        BrowseMode::Rejected,
        BrowseMode::Contacted,
        BrowseMode::Search,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pending" => Some(BrowseMode::Pending),
            "accepted" => Some(BrowseMode::Accepted),
            "rejected" => Some(BrowseMode::Rejected),
            "contacted" => Some(BrowseMode::Contacted),
            "search" => Some(BrowseMode::Search),
            _ => None,
        }
    }
}

/// Computes the ordered result set shown to the reviewer.
pub struct ViewFilter<'a> {
    store: &'a RecordStore,
    preferences: &'a PreferenceIndex,
    classifier: Classifier,
}

impl<'a> ViewFilter<'a> {
    pub fn new(store: &'a RecordStore, preferences: &'a PreferenceIndex) -> Self {
        Self {
            store,
            preferences,
            classifier: Classifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Pending and decision modes are sorted by key; search keeps store order.
    pub fn view(&self, mode: BrowseMode, search_text: Option<&str>) -> StoreResult<Vec<Record>> {
        let records = self.store.get_all()?;
        Ok(self.select(records, mode, search_text))
    }

    pub fn count(&self, mode: BrowseMode, search_text: Option<&str>) -> StoreResult<usize> {
        Ok(self.view(mode, search_text)?.len())
    }

    fn select(&self, records: Vec<Record>, mode: BrowseMode, search_text: Option<&str>) -> Vec<Record> {
        let wanted = match mode {
            BrowseMode::Search => return search(records, search_text),
            BrowseMode::Pending => Decision::None,
            BrowseMode::Accepted => Decision::Accepted,
            BrowseMode::Rejected => Decision::Rejected,
            BrowseMode::Contacted => Decision::Contacted,
        };
        let mut selected: Vec<Record> = records
            .into_iter()
            .filter(|record| self.preferences.get(&record.key) == wanted)
            .filter(|record| {
                mode != BrowseMode::Pending || self.classifier.tier(record) == Tier::Extended
            })
            .collect();
        selected.sort_by(|a, b| a.key.cmp(&b.key));
        selected
    }
}

fn search(records: Vec<Record>, search_text: Option<&str>) -> Vec<Record> {
    let needle = search_text.map(str::trim).unwrap_or_default().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| {
            let fields = &record.fields;
            record.key.to_lowercase().contains(&needle)
                || fields
                    .display_name
                    .as_deref()
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
                || fields
                    .biography
                    .as_deref()
                    .map(|bio| bio.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .collect()
}
