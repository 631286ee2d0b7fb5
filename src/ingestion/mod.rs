//! Collection of basic records from list pages.

pub mod collector;
pub mod error;

pub use collector::{Collector, ProfileSighting, SightingOutcome};
pub use error::{CollectionIssue, CollectionIssueReason};

/// Result of a collection run or a flush.
#[derive(Debug, Clone, Default)]
pub struct CollectionSummary {
    pub sightings: usize,
    pub accepted: usize,
    pub created: usize,
    pub buffered: usize,
    pub rejected: usize,
    pub issues: Vec<CollectionIssue>,
}

impl CollectionSummary {
    pub fn describe(&self) -> String {
        let mut line = format!(
            "Saw {} accounts (accepted {}, new {}, buffered {}, rejected {}).",
            self.sightings, self.accepted, self.created, self.buffered, self.rejected
        );
        if let Some(first) = self.issues.first() {
            line.push_str(&format!(
                " Example issue: {:?} for {:?}.",
                first.reason, first.raw_key
            ));
        }
        line
    }
}
