use super::{extended, IntegrationHarness};
use anyhow::Result;
use profilebase::records::RecordPatch;
use profilebase::review::ReviewSession;
use profilebase::{BrowseMode, Decision, Record, ViewFilter};

fn keys(records: Vec<Record>) -> Vec<String> {
    records.into_iter().map(|record| record.key).collect()
}

#[test]
fn pending_accepted_and_search_views_match_exactly() -> Result<()> {
    let harness = IntegrationHarness::new();
    let mut workspace = harness.workspace();
    let store = workspace.open_record_store()?.store;
    store.upsert("c", &extended(7))?;
    store.upsert("b", &RecordPatch::default())?;
    store.upsert("a", &extended(3))?;
    let mut preferences = workspace.preferences()?;
    preferences.set("c", Decision::Accepted)?;

    let filter = ViewFilter::new(&store, &preferences).with_classifier(workspace.classifier());
    assert_eq!(keys(filter.view(BrowseMode::Pending, None)?), vec!["a"]);
    assert_eq!(keys(filter.view(BrowseMode::Accepted, None)?), vec!["c"]);
    assert_eq!(keys(filter.view(BrowseMode::Search, Some("a"))?), vec!["a"]);
    assert!(filter.view(BrowseMode::Rejected, None)?.is_empty());
    // Empty search shows everything in store order.
    assert_eq!(
        keys(filter.view(BrowseMode::Search, Some(""))?),
        vec!["c", "b", "a"]
    );
    Ok(())
}

#[test]
fn decisions_made_in_a_session_persist_across_restarts() -> Result<()> {
    let harness = IntegrationHarness::new();
    {
        let mut workspace = harness.workspace();
        let store = workspace.open_record_store()?.store;
        for key in ["zed", "yara", "xavi"] {
            store.upsert(key, &extended(1))?;
        }
        let log = workspace.event_log();
        let mut preferences = workspace.preferences()?;
        let mut session = ReviewSession::new(&store, &mut preferences).with_event_log(&log);
        assert_eq!(keys(session.current_view()?), vec!["xavi", "yara", "zed"]);
        session.decide("yara", Decision::Rejected)?;
        session.decide("zed", Decision::Contacted)?;
        session.set_search_text("YA");
        assert_eq!(keys(session.current_view()?), vec!["yara"]);
        session.set_mode(BrowseMode::Pending);
        assert_eq!(session.search_text(), "");
        assert_eq!(keys(session.current_view()?), vec!["xavi"]);
    }

    let mut workspace = harness.workspace();
    let store = workspace.open_record_store()?.store;
    let preferences = workspace.preferences()?;
    let filter = ViewFilter::new(&store, &preferences);
    assert_eq!(keys(filter.view(BrowseMode::Rejected, None)?), vec!["yara"]);
    assert_eq!(keys(filter.view(BrowseMode::Contacted, None)?), vec!["zed"]);
    assert_eq!(preferences.counts().decided(), 2);
    Ok(())
}
