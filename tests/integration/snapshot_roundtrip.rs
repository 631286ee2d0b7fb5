use super::{extended, IntegrationHarness};
use anyhow::Result;
use profilebase::events::EventType;
use profilebase::export::{read_snapshot, SnapshotError};
use profilebase::records::{ProfileFields, RecordPatch, RecordStatus};
use profilebase::review::PreferenceEntry;
use profilebase::{BrowseMode, Decision, ViewFilter};
use std::fs;

#[test]
fn export_then_import_reproduces_records_and_preferences() -> Result<()> {
    let source = IntegrationHarness::new();
    let mut workspace = source.workspace();
    let store = workspace.open_record_store()?.store;
    store.upsert(
        "hana",
        &RecordPatch::fields(ProfileFields {
            display_name: Some("Hana".into()),
            biography: Some("ceramics".into()),
            ..ProfileFields::default()
        })
        .with_status(RecordStatus::Completed)
        .processed_now(),
    )?;
    store.upsert("ivan", &extended(120))?;
    store.upsert("jo", &RecordPatch::default().with_status(RecordStatus::Error).with_attempt_count(1))?;
    let mut preferences = workspace.preferences()?;
    preferences.set("hana", Decision::Accepted)?;
    preferences.set("ivan", Decision::Rejected)?;

    let export_path = source.workspace_path().join("snapshot.json");
    let (path, snapshot) = workspace.export_to(&store, Some(&export_path))?;
    assert_eq!(path, export_path);
    assert_eq!(snapshot.stats.total, 3);
    assert_eq!(snapshot.preferences.len(), 2);

    let target = IntegrationHarness::new();
    let mut imported = target.workspace();
    let target_store = imported.open_record_store()?.store;
    let summary = imported.import_from(&target_store, &export_path)?;
    assert_eq!(summary.records, 3);
    assert_eq!(summary.preferences, 2);
    assert!(summary.skipped.is_empty());

    assert_eq!(target_store.get_all()?, store.get_all()?);
    let copied: Vec<PreferenceEntry> = imported.preferences()?.entries();
    assert_eq!(copied, workspace.preferences()?.entries());
    assert_eq!(
        imported
            .event_log()
            .events_of_type(EventType::SnapshotImported)?
            .len(),
        1
    );
    Ok(())
}

#[test]
fn edited_snapshot_files_are_rejected() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.workspace();
    let store = workspace.open_record_store()?.store;
    store.upsert("kim", &extended(5))?;
    let (path, _) = workspace.export_to(&store, None)?;
    assert!(path.starts_with(&workspace.paths.exports_dir));

    let text = fs::read_to_string(&path)?;
    fs::write(&path, text.replace("\"follower_count\": 5", "\"follower_count\": 50"))?;
    let tampered = read_snapshot(&path)?;
    assert!(matches!(
        tampered.verify(),
        Err(SnapshotError::DigestMismatch { .. })
    ));
    assert!(workspace.import_from(&store, &path).is_err());
    assert_eq!(
        store.get("kim")?.and_then(|record| record.fields.follower_count),
        Some(5)
    );
    Ok(())
}

#[test]
fn import_keeps_the_exported_store_order() -> Result<()> {
    let source = IntegrationHarness::new();
    let mut workspace = source.workspace();
    let store = workspace.open_record_store()?.store;
    for key in ["zoe", "bob", "moe"] {
        store.upsert(key, &RecordPatch::default())?;
    }
    let (path, snapshot) = workspace.export_to(&store, None)?;
    let exported: Vec<&str> = snapshot.records.keys().map(String::as_str).collect();
    assert_eq!(exported, vec!["zoe", "bob", "moe"]);

    let target = IntegrationHarness::new();
    let mut imported = target.workspace();
    let target_store = imported.open_record_store()?.store;
    imported.import_from(&target_store, &path)?;

    let preferences = imported.preferences()?;
    let found: Vec<String> = ViewFilter::new(&target_store, &preferences)
        .view(BrowseMode::Search, Some("o"))?
        .into_iter()
        .map(|record| record.key)
        .collect();
    assert_eq!(found, vec!["zoe", "bob", "moe"]);
    Ok(())
}
