//! State shared between the controller and its workers.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::debug;

use super::{BoundedChannel, JobTable, RetentionPolicy};
use crate::ports::Clock;

/// Channel + table + the completion signal.
///
/// The table's mutex is the controller's single critical section. The channel
/// synchronises itself.
pub(crate) struct Shared {
    pub(crate) table: Mutex<JobTable>,
    pub(crate) channel: BoundedChannel,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) retention: RetentionPolicy,
    /// Bumped whenever a record reaches a terminal state.
    finished: watch::Sender<u64>,
}

impl Shared {
    pub(crate) fn new(capacity: usize, retention: RetentionPolicy, clock: Arc<dyn Clock>) -> Self {
        let (finished, _) = watch::channel(0);
        Self {
            table: Mutex::new(JobTable::new()),
            channel: BoundedChannel::new(capacity),
            clock,
            retention,
            finished,
        }
    }

    /// Lock the Job Table. A panic while holding the lock cannot leave a
    /// record half-written (every update is a single method call), so a
    /// poisoned lock is recovered.
    pub(crate) fn table(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.table().is_running()
    }

    /// Trim old terminal records.
    pub(crate) fn sweep(&self) {
        let evicted = self.table().sweep(&self.retention);
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "retention sweep evicted finished jobs");
        }
    }

    pub(crate) fn signal_finished(&self) {
        self.finished.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub(crate) fn subscribe_finished(&self) -> watch::Receiver<u64> {
        self.finished.subscribe()
    }
}
