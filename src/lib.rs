pub mod config;
pub mod enrichment;
pub mod events;
pub mod export;
pub mod ingestion;
mod persist;
pub mod records;
pub mod review;
pub mod storage;
pub mod workspace;

// Re-export commonly used types for convenience.
pub use config::{AppConfig, PageContext, PageSettings};
pub use enrichment::{Extraction, ExtractionStatus, Extractor, RawProfile, WorkQueue};
pub use events::{EventLog, EventType};
pub use records::{classify, normalize, Classifier, Record, RecordPatch, RecordStatus, Tier};
pub use review::{BrowseMode, Decision, PreferenceIndex, ViewFilter};
pub use storage::{BackendKind, RecordStore};
pub use workspace::Workspace;
