use super::IntegrationHarness;
use anyhow::Result;
use profilebase::events::EventType;
use profilebase::records::{ProfileFields, RecordPatch, RecordStatus};
use profilebase::storage::SCHEMA_VERSION;
use profilebase::BackendKind;
use rusqlite::Connection;

#[test]
fn upsert_merges_fields_instead_of_overwriting() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.workspace();
    let opened = workspace.open_record_store()?;
    assert_eq!(opened.store.backend_kind(), BackendKind::Structured);
    let store = opened.store;

    store.upsert(
        "merge_me",
        &RecordPatch::fields(ProfileFields {
            display_name: Some("Merge".into()),
            ..ProfileFields::default()
        }),
    )?;
    let first = store.get("merge_me")?.expect("record exists");
    store.upsert(
        "merge_me",
        &RecordPatch::fields(ProfileFields {
            biography: Some("bio".into()),
            ..ProfileFields::default()
        })
        .with_status(RecordStatus::Completed)
        .with_attempt_count(0),
    )?;

    let merged = store.get("merge_me")?.expect("record exists");
    assert_eq!(merged.fields.display_name.as_deref(), Some("Merge"));
    assert_eq!(merged.fields.biography.as_deref(), Some("bio"));
    assert_eq!(merged.status, RecordStatus::Completed);
    assert!(merged.last_updated >= first.last_updated);
    assert_eq!(merged.first_seen_at, first.first_seen_at);
    assert_eq!(store.len()?, 1);
    Ok(())
}

#[test]
fn records_survive_reopening_the_structured_store() -> Result<()> {
    let harness = IntegrationHarness::new();
    {
        let mut workspace = harness.workspace();
        let store = workspace.open_record_store()?.store;
        store.upsert("kept", &super::extended(4))?;
        store.upsert("dropped", &RecordPatch::default())?;
        assert!(store.delete("dropped")?);
        assert!(!store.delete("dropped")?);
    }
    let mut workspace = harness.workspace();
    let store = workspace.open_record_store()?.store;
    assert_eq!(store.get("kept")?.and_then(|r| r.fields.follower_count), Some(4));
    assert!(store.get("dropped")?.is_none());
    assert_eq!(store.keys_with_status(RecordStatus::Unset)?, vec!["kept".to_string()]);
    Ok(())
}

#[test]
fn exclusive_lock_forces_a_persisted_fallback() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.impatient_workspace();
    let db_path = workspace.paths.store_location().structured_path;
    drop(workspace.open_record_store()?);

    // Another process holds the write lock for the whole init window.
    let blocker = Connection::open(&db_path)?;
    blocker.execute_batch("BEGIN EXCLUSIVE")?;

    let opened = workspace.open_record_store()?;
    assert!(opened.downgraded);
    assert_eq!(opened.store.backend_kind(), BackendKind::Fallback);
    opened.store.upsert("while_locked", &super::extended(1))?;
    assert!(workspace.config.storage.fallback_locked);

    let downgrades = workspace
        .event_log()
        .events_of_type(EventType::BackendDowngraded)?;
    assert_eq!(downgrades.len(), 1);

    blocker.execute_batch("ROLLBACK")?;
    drop(blocker);

    // The decision is read back from config.toml by a fresh process.
    let mut restarted = harness.workspace();
    assert!(restarted.config.storage.fallback_locked);
    let opened = restarted.open_record_store()?;
    assert!(!opened.downgraded);
    assert_eq!(opened.store.backend_kind(), BackendKind::Fallback);
    assert!(opened.store.get("while_locked")?.is_some());
    drop(opened);

    assert!(restarted.reset_backend_preference()?);
    assert!(!restarted.reset_backend_preference()?);
    let mut after_reset = harness.workspace();
    assert!(!after_reset.config.storage.fallback_locked);
    let opened = after_reset.open_record_store()?;
    assert_eq!(opened.store.backend_kind(), BackendKind::Structured);
    Ok(())
}

#[test]
fn newer_schema_versions_fall_back_instead_of_failing() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.impatient_workspace();
    let db_path = workspace.paths.store_location().structured_path;
    std::fs::create_dir_all(db_path.parent().expect("db has a parent"))?;
    let conn = Connection::open(&db_path)?;
    conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))?;
    drop(conn);

    let opened = workspace.open_record_store()?;
    assert!(opened.downgraded);
    assert_eq!(opened.store.backend_kind(), BackendKind::Fallback);
    Ok(())
}

#[test]
fn v1_databases_upgrade_without_losing_rows() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.workspace();
    let db_path = workspace.paths.store_location().structured_path;
    std::fs::create_dir_all(db_path.parent().expect("db has a parent"))?;
    let conn = Connection::open(&db_path)?;
    conn.execute_batch(
        "CREATE TABLE records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'unset',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            fields TEXT NOT NULL DEFAULT '{}',
            processed_at TEXT,
            last_updated TEXT NOT NULL
        );
        INSERT INTO records (key, status, attempt_count, fields, last_updated)
        VALUES ('legacy', 'completed', 0, '{\"follower_count\": 9}', '2024-05-01T10:00:00Z');
        PRAGMA user_version = 1;",
    )?;
    drop(conn);

    let store = workspace.open_record_store()?.store;
    assert_eq!(store.backend_kind(), BackendKind::Structured);
    let legacy = store.get("legacy")?.expect("legacy row kept");
    assert_eq!(legacy.status, RecordStatus::Completed);
    assert_eq!(legacy.fields.follower_count, Some(9));
    assert_eq!(legacy.first_seen_at, legacy.last_updated);
    Ok(())
}
