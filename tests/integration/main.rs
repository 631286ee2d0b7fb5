use profilebase::records::{ProfileFields, RecordPatch};
use profilebase::{RecordStore, Workspace};
use std::path::Path;
use tempfile::TempDir;

pub struct IntegrationHarness {
    workspace: TempDir,
}

impl IntegrationHarness {
    pub fn new() -> Self {
        let workspace = TempDir::new().expect("failed to create temp workspace");
        Self { workspace }
    }

    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::at(self.workspace.path()).expect("failed to open workspace for tests")
    }

    /// Workspace with a short backend timeout so fallback tests stay fast.
    pub fn impatient_workspace(&self) -> Workspace {
        let mut workspace = self.workspace();
        workspace.config.storage.init_timeout_ms = 300;
        workspace.save_config().expect("failed to save test config");
        workspace
    }
}

pub fn extended(followers: i64) -> RecordPatch {
    RecordPatch::fields(ProfileFields {
        follower_count: Some(followers),
        ..ProfileFields::default()
    })
}

pub fn seed_basic(store: &RecordStore, keys: &[&str]) {
    for key in keys {
        store
            .upsert(key, &RecordPatch::default())
            .expect("failed to seed record");
    }
}

mod normalize_dedup;
mod queue_resume;
mod snapshot_roundtrip;
mod store_backends;
mod view_filter;
