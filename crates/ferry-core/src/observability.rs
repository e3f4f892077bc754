//! Point-in-time views of the queue for status endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::JobStatus;

/// Number of tracked records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: JobStatus) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    fn slot(&mut self, status: JobStatus) -> &mut usize {
        match status {
            JobStatus::Queued => &mut self.queued,
            JobStatus::Processing => &mut self.processing,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Cancelled => &mut self.cancelled,
        }
    }
}

impl FromIterator<JobStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = JobStatus>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for status in iter {
            counts.record(status);
        }
        counts
    }
}

/// Snapshot returned by `QueueController::info`.
///
/// Taken under the Job Table lock, so `status_histogram.total()` always
/// equals `total_tracked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// Items buffered in the work channel (wake-up sentinels included).
    pub queue_depth: usize,
    pub total_tracked: usize,
    pub active_workers: usize,
    pub max_workers: usize,
    pub status_histogram: StatusCounts,
    pub running: bool,
}
