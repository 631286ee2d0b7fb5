#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionIssueReason {
    /// The raw key did not survive normalization; the sighting is dropped.
    InvalidKey,
    /// Writing the sighting to the store failed.
    StoreFailure,
}

#[derive(Debug, Clone)]
pub struct CollectionIssue {
    pub raw_key: String,
    pub reason: CollectionIssueReason,
    pub message: String,
}

impl CollectionIssue {
    pub fn new(raw_key: impl Into<String>, reason: CollectionIssueReason, message: impl Into<String>) -> Self {
        Self {
            raw_key: raw_key.into(),
            reason,
            message: message.into(),
        }
    }
}
