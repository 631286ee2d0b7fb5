use super::queue::QueueState;

pub fn format_queue_status(state: Option<&QueueState>) -> String {
    let Some(state) = state else {
        return "Queue idle: no enrichment run in progress.".to_string();
    };
    let percent = if state.items.is_empty() {
        100.0
    } else {
        (state.cursor as f64 / state.items.len() as f64) * 100.0
    };
    let last = state
        .last_dispatched
        .as_ref()
        .map(|key| format!("last dispatched {key}"))
        .unwrap_or_else(|| "nothing dispatched yet".into());
    format!(
        "Run {} -> {:?}: pass {}, {:.1}% through ({} of {}, dispatched {}, skipped {}), {}.",
        state.run_id,
        state.status,
        state.pass,
        percent,
        state.cursor,
        state.items.len(),
        state.total_dispatched(),
        state.skipped,
        last
    )
}
