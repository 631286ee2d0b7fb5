use super::{seed_basic, IntegrationHarness};
use anyhow::Result;
use profilebase::enrichment::{
    format_queue_status, EnrichmentDriver, Extraction, ExtractionStatus, RawProfile, StepOutcome,
};
use profilebase::events::EventType;
use profilebase::records::{RecordStatus, Tier};
use profilebase::{Record, RecordStore, Workspace};

const KEYS: [&str; 5] = ["amy", "bo", "cat", "dov", "eve"];

fn scripted(key: &str) -> Extraction {
    match key {
        "amy" | "eve" => Extraction::Profile(RawProfile {
            display_name: Some(key.to_uppercase()),
            follower_count: Some(key.len() as i64),
            ..RawProfile::default()
        }),
        "cat" => Extraction::Status(ExtractionStatus::Private),
        "dov" => Extraction::Status(ExtractionStatus::NoData),
        _ => Extraction::failed("page did not load"),
    }
}

/// Store contents without timestamps.
fn fingerprint(store: &RecordStore) -> Result<Vec<(String, &'static str, u32, Option<i64>)>> {
    let mut rows: Vec<_> = store
        .get_all()?
        .into_iter()
        .map(|record: Record| {
            (
                record.key,
                record.status.as_str(),
                record.attempt_count,
                record.fields.follower_count,
            )
        })
        .collect();
    rows.sort();
    Ok(rows)
}

fn open(harness: &IntegrationHarness) -> Result<(Workspace, RecordStore)> {
    let mut workspace = harness.workspace();
    let store = workspace.open_record_store()?.store;
    Ok((workspace, store))
}

#[test]
fn always_failing_items_get_exactly_max_attempts_each() -> Result<()> {
    let harness = IntegrationHarness::new();
    let (workspace, store) = open(&harness)?;
    let keys = ["f1", "f2", "f3", "f4"];
    seed_basic(&store, &keys);
    let log = workspace.event_log();
    let queue = workspace.work_queue(&store, &log);
    queue.start(keys)?;

    let mut dispatched = 0;
    loop {
        match queue.step()? {
            StepOutcome::Dispatched { key, .. } => {
                dispatched += 1;
                queue.complete(&key, Extraction::failed("always"))?;
            }
            StepOutcome::Completed { passes, corrupted, .. } => {
                assert_eq!(passes, 3);
                assert!(!corrupted);
                break;
            }
            StepOutcome::Idle => panic!("queue went idle before completing"),
        }
        assert!(dispatched <= 3 * keys.len(), "dispatch bound exceeded");
    }
    assert_eq!(dispatched, 3 * keys.len());
    assert_eq!(queue.step()?, StepOutcome::Idle);
    assert!(queue.state()?.is_none());

    let classifier = workspace.classifier();
    for key in keys {
        let record = store.get(key)?.expect("record kept");
        assert_eq!(record.attempt_count, 3);
        assert_eq!(classifier.tier(&record), Tier::Error);
    }
    assert_eq!(log.events_of_type(EventType::EnrichmentFailed)?.len(), 12);
    assert_eq!(log.events_of_type(EventType::QueueCompleted)?.len(), 1);
    Ok(())
}

#[test]
fn without_retry_sweep_each_item_is_dispatched_once() -> Result<()> {
    let harness = IntegrationHarness::new();
    let (mut workspace, store) = open(&harness)?;
    workspace.config.queue.retry_failed_items = false;
    seed_basic(&store, &["g1", "g2"]);
    let log = workspace.event_log();
    let queue = workspace.work_queue(&store, &log);
    queue.start_pending()?;

    let summary = EnrichmentDriver::new(&queue, |_: &str| Extraction::failed("nope")).run()?;
    assert!(summary.completed);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(store.get("g1")?.map(|r| r.attempt_count), Some(1));
    Ok(())
}

#[test]
fn restarting_between_every_step_matches_an_uninterrupted_run() -> Result<()> {
    let steady = IntegrationHarness::new();
    let (workspace, store) = open(&steady)?;
    seed_basic(&store, &KEYS);
    let log = workspace.event_log();
    let queue = workspace.work_queue(&store, &log);
    queue.start_pending()?;
    let summary = EnrichmentDriver::new(&queue, scripted).run()?;
    assert!(summary.completed);
    let expected = fingerprint(&store)?;
    drop(queue);

    let crashing = IntegrationHarness::new();
    {
        let (workspace, store) = open(&crashing)?;
        seed_basic(&store, &KEYS);
        let log = workspace.event_log();
        workspace.work_queue(&store, &log).start_pending()?;
    }

    let mut lost_first_amy = false;
    loop {
        // Every iteration is a fresh process: workspace, store, and queue are
        // rebuilt from disk.
        let (workspace, store) = open(&crashing)?;
        let log = workspace.event_log();
        let dispatched = {
            let queue = workspace.work_queue(&store, &log);
            let status_line = format_queue_status(queue.state()?.as_ref());
            assert!(status_line.starts_with("Run "));
            match queue.step()? {
                StepOutcome::Dispatched { key, .. } => key,
                StepOutcome::Completed { .. } => break,
                StepOutcome::Idle => panic!("run vanished mid-way"),
            }
        };
        if dispatched == "amy" && !lost_first_amy {
            // The worker died before the extractor reported back.
            lost_first_amy = true;
            continue;
        }
        drop(store);

        // The extractor's result lands in the next process.
        let (workspace, store) = open(&crashing)?;
        let log = workspace.event_log();
        workspace
            .work_queue(&store, &log)
            .complete(&dispatched, scripted(&dispatched))?;
    }

    let (workspace, store) = open(&crashing)?;
    assert!(lost_first_amy);
    assert_eq!(fingerprint(&store)?, expected);
    assert!(workspace.queue_slot().load()?.is_none());
    Ok(())
}

#[test]
fn stopping_mid_run_ignores_the_late_callback() -> Result<()> {
    let harness = IntegrationHarness::new();
    let (workspace, store) = open(&harness)?;
    seed_basic(&store, &["late"]);
    let log = workspace.event_log();
    let queue = workspace.work_queue(&store, &log);
    queue.start_pending()?;
    assert!(matches!(queue.step()?, StepOutcome::Dispatched { .. }));
    assert!(queue.stop()?);
    queue.complete("late", scripted("amy"))?;

    let record = store.get("late")?.expect("record kept");
    assert_eq!(record.status, RecordStatus::Unset);
    assert_eq!(log.events_of_type(EventType::EnrichmentIgnored)?.len(), 1);
    assert_eq!(queue.step()?, StepOutcome::Idle);
    Ok(())
}
