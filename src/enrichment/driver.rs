use super::queue::{StepOutcome, WorkQueue};
use super::{ApplyOutcome, Extractor};
use crate::config::PageSettings;
use anyhow::Result;

/// Tally of one driver invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverSummary {
    pub dispatched: usize,
    pub applied: usize,
    pub failed: usize,
    pub ignored: usize,
    /// The run reached its end (normally or after a corrupt slot).
    pub completed: bool,
    pub corrupted: bool,
}

impl DriverSummary {
    pub fn describe(&self) -> String {
        let state = if self.corrupted {
            "queue state was unusable and has been cleared"
        } else if self.completed {
            "queue finished"
        } else {
            "queue paused"
        };
        format!(
            "Dispatched {} (applied {}, failed {}, ignored {}); {state}.",
            self.dispatched, self.applied, self.failed, self.ignored
        )
    }
}

/// Runs step -> extract -> complete cycles against a queue. With
/// `auto_advance` off it stops after each enrichment, the way a reviewer
/// clicking through pages would.
pub struct EnrichmentDriver<'q, 'a, E> {
    queue: &'q WorkQueue<'a>,
    extractor: E,
    auto_advance: bool,
}

impl<'q, 'a, E: Extractor> EnrichmentDriver<'q, 'a, E> {
    pub fn new(queue: &'q WorkQueue<'a>, extractor: E) -> Self {
        Self {
            queue,
            extractor,
            auto_advance: true,
        }
    }

    pub fn with_page_settings(mut self, settings: &PageSettings) -> Self {
        self.auto_advance = settings.auto_advance;
        self
    }

    /// Drives the queue until it idles, completes, or `auto_advance` stops it.
    pub fn run(&mut self) -> Result<DriverSummary> {
        self.run_for(usize::MAX)
    }

    /// Like `run`, but dispatches at most `limit` items.
    pub fn run_for(&mut self, limit: usize) -> Result<DriverSummary> {
        let mut summary = DriverSummary::default();
        while summary.dispatched < limit {
            match self.queue.step()? {
                StepOutcome::Idle => break,
                StepOutcome::Completed { corrupted, .. } => {
                    summary.completed = true;
                    summary.corrupted = corrupted;
                    break;
                }
                StepOutcome::Dispatched { key, .. } => {
                    summary.dispatched += 1;
                    let extraction = self.extractor.extract(&key);
                    match self.queue.complete(&key, extraction)? {
                        ApplyOutcome::Applied { failed: true, .. } => summary.failed += 1,
                        ApplyOutcome::Applied { failed: false, .. } => summary.applied += 1,
                        ApplyOutcome::Ignored(_) => summary.ignored += 1,
                    }
                    if !self.auto_advance {
                        break;
                    }
                }
            }
        }
        Ok(summary)
    }
}
