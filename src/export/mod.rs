//! Snapshot export and import.
//!
//! A snapshot is the interchange document for a whole workspace: every record
//! keyed by its normalized key, the reviewer's decisions, summary counts, and a
//! digest so a hand-edited or truncated file is refused on import.

mod snapshot;

pub use snapshot::{
    export_snapshot, import_snapshot, read_snapshot, write_snapshot, ImportSummary, Snapshot,
    SnapshotError, SnapshotStats, SNAPSHOT_FORMAT_VERSION,
};
