use crate::lifecycle::JobState;
use crate::registry::JobResult;
use serde::Serialize;
use std::fmt;

/// Counts of sync job outcomes for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl SyncSummary {
    pub fn record(&mut self, result: &JobResult) {
        self.total += 1;
        match result.state {
            JobState::Succeeded => self.succeeded += 1,
            JobState::Failed => self.failed += 1,
            JobState::Cancelled => self.cancelled += 1,
            JobState::Skipped => self.skipped += 1,
            JobState::Queued | JobState::Admitted | JobState::Running => {}
        }
    }

    /// No job failed or was cancelled.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

impl<'a> FromIterator<&'a JobResult> for SyncSummary {
    fn from_iter<I: IntoIterator<Item = &'a JobResult>>(iter: I) -> Self {
        let mut summary = Self::default();
        for r in iter {
            summary.record(r);
        }
        summary
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} succeeded, {} failed, {} cancelled, {} skipped",
            self.total, self.succeeded, self.failed, self.cancelled, self.skipped
        )
    }
}
