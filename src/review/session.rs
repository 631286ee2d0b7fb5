use super::preferences::{Decision, PreferenceIndex};
use super::view::{BrowseMode, ViewFilter};
use crate::events::{log_to, EventLog, EventType};
use crate::records::{Classifier, Record};
use crate::storage::RecordStore;
use anyhow::Result;
use serde_json::json;
use std::collections::BTreeMap;

/// Transient reviewer state: current mode and search text. Nothing here is
/// persisted except the decisions written through to the `PreferenceIndex`.
pub struct ReviewSession<'a> {
    store: &'a RecordStore,
    preferences: &'a mut PreferenceIndex,
    classifier: Classifier,
    log: Option<&'a EventLog>,
    mode: BrowseMode,
    search_text: String,
}

impl<'a> ReviewSession<'a> {
    pub fn new(store: &'a RecordStore, preferences: &'a mut PreferenceIndex) -> Self {
        Self {
            store,
            preferences,
            classifier: Classifier::default(),
            log: None,
            mode: BrowseMode::default(),
            search_text: String::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_event_log(mut self, log: &'a EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn mode(&self) -> BrowseMode {
        self.mode
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    /// Leaving search mode drops the search text.
    pub fn set_mode(&mut self, mode: BrowseMode) {
        if self.mode == BrowseMode::Search && mode != BrowseMode::Search {
            self.search_text.clear();
        }
        self.mode = mode;
    }

    /// Typing a query switches to search mode.
    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search_text = text.into();
        self.mode = BrowseMode::Search;
    }

    pub fn current_view(&self) -> Result<Vec<Record>> {
        let search = (self.mode == BrowseMode::Search).then_some(self.search_text.as_str());
        Ok(self.filter().view(self.mode, search)?)
    }

    /// Result counts for every mode, for tab badges. Search is counted with
    /// the current search text.
    pub fn mode_counts(&self) -> Result<BTreeMap<&'static str, usize>> {
        let filter = self.filter();
        let mut counts = BTreeMap::new();
        for mode in BrowseMode::ALL {
            let label = match mode {
                BrowseMode::Pending => "pending",
                BrowseMode::Accepted => "accepted",
                BrowseMode::Rejected => "rejected",
                BrowseMode::Contacted => "contacted",
                BrowseMode::Search => "search",
            };
            counts.insert(label, filter.count(mode, Some(self.search_text.as_str()))?);
        }
        Ok(counts)
    }

    pub fn decide(&mut self, key: &str, decision: Decision) -> Result<()> {
        let previous = self.preferences.get(key);
        self.preferences.set(key, decision)?;
        log_to(
            self.log,
            EventType::DecisionRecorded,
            json!({
                "key": key,
                "from": previous.as_str(),
                "to": decision.as_str(),
            }),
        );
        Ok(())
    }

    fn filter(&self) -> ViewFilter<'_> {
        ViewFilter::new(self.store, &*self.preferences).with_classifier(self.classifier)
    }
}
