use super::{Record, RecordStatus};
use serde::{Deserialize, Serialize};

/// Failed enrichment attempts allowed before a record is skipped for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Derived completeness level of a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Extended,
    Basic,
    Inaccessible,
    NoData,
    Error,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Extended,
        Tier::Basic,
        Tier::Inaccessible,
        Tier::NoData,
        Tier::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Extended => "extended",
            Tier::Basic => "basic",
            Tier::Inaccessible => "inaccessible",
            Tier::NoData => "no_data",
            Tier::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub tier: Tier,
    pub label: &'static str,
    pub detail: String,
}

/// Maps records onto review tiers. Pure: the same record always yields the
/// same classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    max_attempts: u32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl Classifier {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn tier(&self, record: &Record) -> Tier {
        let fields = &record.fields;
        if matches!(
            record.status,
            RecordStatus::Inaccessible | RecordStatus::Private
        ) {
            return Tier::Inaccessible;
        }
        if record.status == RecordStatus::NoData || fields.follower_count == Some(-1) {
            return Tier::NoData;
        }
        if fields.follower_count.map(|count| count >= 0).unwrap_or(false)
            || fields.biography.is_some()
            || fields.display_name.is_some()
            || fields.has_recent_posts()
        {
            return Tier::Extended;
        }
        if record.status == RecordStatus::Error && record.attempt_count >= self.max_attempts {
            return Tier::Error;
        }
        Tier::Basic
    }

    pub fn classify(&self, record: &Record) -> Classification {
        let tier = self.tier(record);
        let fields = &record.fields;
        let (label, detail) = match tier {
            Tier::Inaccessible if record.status == RecordStatus::Private => {
                ("Private", "Profile is private".to_string())
            }
            Tier::Inaccessible => ("Inaccessible", "Profile could not be opened".to_string()),
            Tier::NoData => ("No data", "Enrichment ran and found nothing".to_string()),
            Tier::Extended => ("Extended data", extended_detail(record)),
            Tier::Error => (
                "Failed",
                format!("Gave up after {} attempts", record.attempt_count),
            ),
            Tier::Basic if record.attempt_count > 0 => (
                "Basic",
                format!(
                    "Retrying enrichment (attempt {} of {})",
                    record.attempt_count, self.max_attempts
                ),
            ),
            Tier::Basic if fields.profile_image_ref.is_some() => {
                ("Basic", "Username and picture only".to_string())
            }
            Tier::Basic => ("Basic", "Username only".to_string()),
        };
        Classification {
            tier,
            label,
            detail,
        }
    }

    /// Whether the enrichment queue should still spend an attempt on `record`.
    pub fn needs_enrichment(&self, record: &Record) -> bool {
        self.tier(record) == Tier::Basic && record.attempt_count < self.max_attempts
    }
}

/// Classifies with the default attempt limit.
pub fn classify(record: &Record) -> Classification {
    Classifier::default().classify(record)
}

fn extended_detail(record: &Record) -> String {
    let fields = &record.fields;
    let mut parts = Vec::new();
    if let Some(followers) = fields.follower_count.filter(|count| *count >= 0) {
        parts.push(format!("{followers} followers"));
    }
    if let Some(posts) = fields.post_count {
        parts.push(format!("{posts} posts"));
    }
    if let Some(recent) = fields.recent_posts.as_ref().filter(|p| !p.is_empty()) {
        parts.push(format!("{} recent posts captured", recent.len()));
    }
    if parts.is_empty() {
        if fields.biography.is_some() {
            parts.push("biography only".to_string());
        } else {
            parts.push("display name only".to_string());
        }
    }
    parts.join(", ")
}
