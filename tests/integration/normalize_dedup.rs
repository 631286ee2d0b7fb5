use super::IntegrationHarness;
use anyhow::Result;
use profilebase::events::EventType;
use profilebase::records::{dedup_records, normalize, RecordPatch, RecordStatus};
use profilebase::Decision;

#[test]
fn normalization_is_idempotent() {
    let samples = [
        "alice",
        "  @Alice.Smith!!  ",
        "bob_99,",
        "(carol)",
        "dave...",
        "_hidden",
        "explore",
        "REELS",
        "...",
        "",
        "way_too_long_for_a_username_at_all",
        "has space",
        "émile",
    ];
    for raw in samples {
        let once = normalize(raw);
        if let Some(key) = &once {
            assert_eq!(normalize(key).as_ref(), Some(key), "not idempotent for {raw:?}");
        }
    }
    assert_eq!(normalize("  @Alice.Smith!!  ").as_deref(), Some("Alice.Smith"));
    assert_eq!(normalize("explore"), None);
    assert_eq!(normalize("..."), None);
}

#[test]
fn dedup_on_open_merges_keys_and_moves_decisions() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.workspace();
    {
        let store = workspace.open_record_store()?.store;
        store.upsert("frank", &RecordPatch::default())?;
        store.upsert(
            "frank.",
            &super::extended(30)
                .with_status(RecordStatus::Completed)
                .processed_now(),
        )?;
        store.upsert("grace,", &super::extended(2))?;
        store.upsert("_bad_", &RecordPatch::default())?;
        let mut preferences = workspace.preferences()?;
        preferences.set("grace,", Decision::Contacted)?;
        preferences.set("frank", Decision::Rejected)?;
        preferences.set("frank.", Decision::Accepted)?;
    }

    let opened = workspace.open_record_store()?;
    assert_eq!(opened.dedup.merged.len(), 2);
    assert_eq!(opened.dedup.unresolvable, vec!["_bad_".to_string()]);

    let store = &opened.store;
    let frank = store.get("frank")?.expect("merged record");
    assert_eq!(frank.status, RecordStatus::Completed);
    assert_eq!(frank.fields.follower_count, Some(30));
    assert!(frank.processed_at.is_some());
    assert!(store.get("frank.")?.is_none());
    assert!(store.get("grace")?.is_some());
    assert_eq!(workspace.preferences()?.get("grace"), Decision::Contacted);
    assert_eq!(workspace.preferences()?.get("grace,"), Decision::None);
    assert_eq!(workspace.preferences()?.get("frank"), Decision::Rejected);
    assert_eq!(workspace.preferences()?.get("frank."), Decision::None);

    let merged_events = workspace
        .event_log()
        .events_of_type(EventType::DuplicatesMerged)?;
    assert_eq!(merged_events.len(), 1);
    assert_eq!(merged_events[0].details["preferences_moved"], 1);
    assert_eq!(merged_events[0].details["preferences_dropped"], 1);

    let before = store.get_all()?;
    let second = dedup_records(store)?;
    assert!(second.is_empty());
    assert_eq!(store.get_all()?, before);
    Ok(())
}
