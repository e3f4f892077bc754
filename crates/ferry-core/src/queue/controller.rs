//! Queue controller: the public face of the queue.
//!
//! Owns the work channel, the Job Table and the worker pool, and exposes
//! submit / status / cancel / info / wait plus the start / stop lifecycle.
//!
//! # Known limitations
//! - No per-conversation ordering: two messages with the same correlation key
//!   can be processed at the same time by different workers, and may finish
//!   in either order.
//! - No per-job timeout: a processing call that never returns keeps its
//!   worker busy for good, so `max_workers` stuck jobs stall the queue.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::shared::Shared;
use crate::config::QueueConfig;
use crate::domain::{JobId, JobRecord, JobStatus, StatusUpdate};
use crate::error::QueueError;
use crate::observability::QueueInfo;
use crate::ports::{Clock, IdGenerator, MessageProcessor, StatusCallback, SystemClock, UlidGenerator};
use crate::runtime::Runtime;
use crate::worker::WorkerPool;

/// Bounded, multi-worker, status-tracked job queue.
///
/// # Usage
/// ```ignore
/// let queue = QueueController::new(QueueConfig::default())?;
/// queue.configure(Arc::new(processor), Arc::new(callback))?;
/// queue.start().await?;
///
/// let id = queue.submit("conv1", "sess1", "hello").await?;
/// let record = queue.wait(id, Duration::from_secs(30)).await?;
///
/// queue.stop().await;
/// ```
pub struct QueueController {
    config: QueueConfig,
    shared: Arc<Shared>,
    ids: Arc<dyn IdGenerator>,
    runtime: RwLock<Option<Runtime>>,
    pool: Mutex<Option<WorkerPool>>,
}

impl QueueController {
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Controller whose timestamps (and id timestamps) come from `clock`.
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Result<Self, QueueError> {
        config.validate()?;
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let shared = Shared::new(config.capacity, config.retention, clock);
        Ok(Self {
            config,
            shared: Arc::new(shared),
            ids,
            runtime: RwLock::new(None),
            pool: Mutex::new(None),
        })
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Install the processing function and status callback.
    ///
    /// Takes effect for the next `start`; rejected while running.
    pub fn configure(
        &self,
        processor: Arc<dyn MessageProcessor>,
        callback: Arc<dyn StatusCallback>,
    ) -> Result<(), QueueError> {
        if self.shared.is_running() {
            return Err(QueueError::Running("configure"));
        }
        *self.runtime.write().unwrap_or_else(|e| e.into_inner()) =
            Some(Runtime::new(processor, callback));
        Ok(())
    }

    /// Spawn the worker pool. No-op when already running.
    pub async fn start(&self) -> Result<(), QueueError> {
        let mut pool = self.pool.lock().await;
        if pool.is_some() {
            return Ok(());
        }
        let runtime = self.runtime()?;

        self.shared.table().set_running(true);
        *pool = Some(WorkerPool::spawn(
            self.config.max_workers,
            Arc::clone(&self.shared),
            runtime,
        ));
        info!(workers = self.config.max_workers, capacity = self.config.capacity, "queue started");
        Ok(())
    }

    /// Stop the worker pool and wait (bounded by `join_timeout`) for it.
    ///
    /// Queued jobs stay in the channel and are picked up after the next
    /// `start`. No-op when not running.
    pub async fn stop(&self) {
        let mut pool = self.pool.lock().await;
        let Some(workers) = pool.take() else {
            return;
        };

        self.shared.table().set_running(false);
        for _ in 0..workers.len() {
            self.shared.channel.wake();
        }
        let stragglers = workers.shutdown_and_join(self.config.join_timeout).await;
        // stragglers exit on their own stop signal without dequeuing again
        let purged = self.shared.channel.purge_sentinels().await;
        debug!(purged, "removed unconsumed wake-ups");
        if stragglers > 0 {
            warn!(stragglers, "queue stopped with workers still busy");
        } else {
            info!("queue stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Queue a message and return its id immediately.
    ///
    /// Waits at most `enqueue_timeout` for channel capacity. On
    /// `QueueError::QueueFull`, or when the caller drops this future while it
    /// waits, the record is removed again and the callback sees
    /// `Queued -> Cancelled` for the id.
    pub async fn submit(
        &self,
        correlation_key: impl Into<String>,
        submitter_key: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<JobId, QueueError> {
        let runtime = self.runtime()?;
        let id = self.ids.generate_job_id();
        let record = JobRecord::new(
            id,
            correlation_key,
            submitter_key,
            payload,
            self.shared.clock.now(),
        );
        let conversation = record.correlation_key.clone();

        self.shared.table().insert(record);
        let pending = PendingSubmit::new(&self.shared, &runtime, id);
        // before the push, so no worker can report Processing ahead of it
        runtime.notify(&StatusUpdate::new(id, JobStatus::Queued));

        if let Err(e) = self
            .shared
            .channel
            .enqueue(id, self.config.enqueue_timeout)
            .await
        {
            warn!(job = %id, conversation = %conversation, error = %e, "rejected job");
            pending.reject(e.to_string());
            return Err(e);
        }
        pending.accept();

        info!(job = %id, conversation = %conversation, "queued job");
        Ok(id)
    }

    /// Snapshot of one record.
    pub fn status(&self, id: JobId) -> Result<JobRecord, QueueError> {
        self.shared
            .table()
            .get(&id)
            .cloned()
            .ok_or(QueueError::NotFound(id))
    }

    /// Cancel a job that no worker has picked up yet.
    ///
    /// True only if the job existed and was Queued.
    pub fn cancel(&self, id: JobId) -> bool {
        let now = self.shared.clock.now();
        let cancelled = self.shared.table().cancel(&id, now);
        if cancelled {
            info!(job = %id, "cancelled job");
            if let Ok(runtime) = self.runtime() {
                runtime.notify(&StatusUpdate::new(id, JobStatus::Cancelled));
            }
            self.shared.signal_finished();
        }
        cancelled
    }

    /// Consistent point-in-time view of the queue.
    pub fn info(&self) -> QueueInfo {
        let table = self.shared.table();
        QueueInfo {
            queue_depth: self.shared.channel.depth(),
            total_tracked: table.len(),
            active_workers: table.active_workers(),
            max_workers: self.config.max_workers,
            status_histogram: table.counts(),
            running: table.is_running(),
        }
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self, id: JobId, timeout: Duration) -> Result<JobRecord, QueueError> {
        // subscribe before the first check so no completion slips between
        let mut finished = self.shared.subscribe_finished();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let record = self.status(id)?;
            if record.is_terminal() {
                return Ok(record);
            }
            match tokio::time::timeout_at(deadline, finished.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(QueueError::ChannelClosed),
                Err(_) => return Err(QueueError::WaitTimeout(id)),
            }
        }
    }

    /// Drop every record and buffered id. Only allowed while stopped and
    /// once no worker is still finishing a job. Returns the records removed.
    pub async fn reset(&self) -> Result<usize, QueueError> {
        let pool = self.pool.lock().await;
        if pool.is_some() || self.shared.table().active_workers() > 0 {
            return Err(QueueError::Running("reset"));
        }

        let drained = self.shared.channel.drain().await;
        let removed = self.shared.table().clear();
        info!(removed, drained, "queue reset");
        Ok(removed)
    }

    fn runtime(&self) -> Result<Runtime, QueueError> {
        self.runtime
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(QueueError::NotConfigured)
    }
}

/// A record inserted by `submit` whose id is not in the channel yet.
///
/// Dropping it unaccepted removes the record, so a rejected or abandoned
/// submit leaves nothing behind in the Job Table.
struct PendingSubmit<'a> {
    shared: &'a Shared,
    runtime: &'a Runtime,
    id: JobId,
    reason: Option<String>,
    accepted: bool,
}

impl<'a> PendingSubmit<'a> {
    fn new(shared: &'a Shared, runtime: &'a Runtime, id: JobId) -> Self {
        Self {
            shared,
            runtime,
            id,
            reason: None,
            accepted: false,
        }
    }

    fn accept(mut self) {
        self.accepted = true;
    }

    fn reject(mut self, reason: String) {
        self.reason = Some(reason);
    }
}

impl Drop for PendingSubmit<'_> {
    fn drop(&mut self) {
        if self.accepted {
            return;
        }
        let removed = self.shared.table().remove(&self.id);
        // a concurrent cancel already reported the terminal state
        if removed.map(|r| r.status) != Some(JobStatus::Queued) {
            return;
        }
        let reason = self.reason.take().unwrap_or_else(|| {
            warn!(job = %self.id, "submit abandoned before the job was queued");
            "submit abandoned before the job was queued".to_string()
        });
        let mut update = StatusUpdate::new(self.id, JobStatus::Cancelled);
        update.error = Some(reason);
        self.runtime.notify(&update);
        self.shared.signal_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use crate::ports::{BlockingProcessor, FixedClock, NoopCallback};
    use chrono::{TimeZone, Utc};

    fn upper() -> Arc<dyn MessageProcessor> {
        Arc::new(BlockingProcessor::new(|_, _, msg| {
            Ok(serde_json::Value::String(msg.to_uppercase()))
        }))
    }

    fn configured(config: QueueConfig) -> QueueController {
        let queue = QueueController::new(config).unwrap();
        queue.configure(upper(), Arc::new(NoopCallback)).unwrap();
        queue
    }

    #[test]
    fn new_rejects_invalid_config() {
        let err = QueueController::new(QueueConfig::default().with_capacity(0))
            .err()
            .unwrap();
        assert!(matches!(err, QueueError::Config(_)));
    }

    #[tokio::test]
    async fn start_and_submit_require_configure() {
        let queue = QueueController::new(QueueConfig::default()).unwrap();

        assert!(matches!(queue.start().await, Err(QueueError::NotConfigured)));
        assert!(matches!(
            queue.submit("c", "s", "m").await,
            Err(QueueError::NotConfigured)
        ));
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn configure_is_rejected_while_running() {
        let queue = configured(QueueConfig::default());
        queue.start().await.unwrap();

        let err = queue.configure(upper(), Arc::new(NoopCallback)).unwrap_err();
        assert!(matches!(err, QueueError::Running("configure")));

        queue.stop().await;
        assert!(queue.configure(upper(), Arc::new(NoopCallback)).is_ok());
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let queue = configured(QueueConfig::default().with_max_workers(3));
        queue.start().await.unwrap();
        queue.start().await.unwrap();

        let info = queue.info();
        assert!(info.running);
        assert_eq!(info.max_workers, 3);

        queue.stop().await;
        queue.stop().await;
        assert!(!queue.info().running);
    }

    #[tokio::test]
    async fn submitted_job_is_queued_with_clock_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let queue =
            QueueController::with_clock(QueueConfig::default(), Arc::new(FixedClock::new(at)))
                .unwrap();
        queue.configure(upper(), Arc::new(NoopCallback)).unwrap();

        let id = queue.submit("conv1", "sess1", "hello").await.unwrap();
        let record = queue.status(id).unwrap();

        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.submitted_at, at);
        assert_eq!(record.correlation_key, "conv1");
        assert_eq!(record.submitter_key, "sess1");
        assert_eq!(record.payload, "hello");
        assert_eq!(id.as_ulid().timestamp_ms(), at.timestamp_millis() as u64);
        assert_eq!(queue.info().queue_depth, 1);
    }

    #[tokio::test]
    async fn status_of_unknown_id_is_not_found() {
        let queue = configured(QueueConfig::default());
        let id = JobId::from_ulid(ulid::Ulid::new());
        assert!(matches!(queue.status(id), Err(QueueError::NotFound(missing)) if missing == id));
        assert!(!queue.cancel(id));
    }

    #[tokio::test]
    async fn cancelled_job_is_skipped_by_workers() {
        let queue = configured(QueueConfig::default().with_max_workers(1));
        let cancelled = queue.submit("c", "s", "drop me").await.unwrap();
        let kept = queue.submit("c", "s", "keep me").await.unwrap();

        assert!(queue.cancel(cancelled));
        assert!(!queue.cancel(cancelled));

        queue.start().await.unwrap();
        let done = queue.wait(kept, Duration::from_secs(5)).await.unwrap();
        assert_eq!(done.result, Some(serde_json::json!("KEEP ME")));

        let record = queue.status(cancelled).unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_some());

        queue.stop().await;
    }

    #[tokio::test]
    async fn failed_processing_is_recorded_not_returned() {
        let queue = QueueController::new(QueueConfig::default()).unwrap();
        queue
            .configure(
                Arc::new(BlockingProcessor::new(|_, _, _| {
                    Err(ProcessingError::failed("genie space unavailable"))
                })),
                Arc::new(NoopCallback),
            )
            .unwrap();
        queue.start().await.unwrap();

        let id = queue.submit("c", "s", "m").await.unwrap();
        let record = queue.wait(id, Duration::from_secs(5)).await.unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("genie space unavailable"));
        assert!(record.result.is_none());
        assert!(record.started_at.is_some());

        queue.stop().await;
    }

    #[tokio::test]
    async fn wait_times_out_while_not_running() {
        let queue = configured(QueueConfig::default());
        let id = queue.submit("c", "s", "m").await.unwrap();

        let err = queue.wait(id, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, QueueError::WaitTimeout(waited) if waited == id));
    }

    #[tokio::test]
    async fn reset_clears_records_only_when_stopped() {
        let queue = configured(QueueConfig::default());
        queue.submit("c", "s", "a").await.unwrap();
        queue.submit("c", "s", "b").await.unwrap();

        queue.start().await.unwrap();
        assert!(matches!(queue.reset().await, Err(QueueError::Running("reset"))));
        queue.stop().await;

        // the two jobs may or may not have run; either way they are tracked
        assert_eq!(queue.reset().await.unwrap(), 2);
        let info = queue.info();
        assert_eq!(info.total_tracked, 0);
        assert_eq!(info.queue_depth, 0);
    }

    fn recording() -> (Arc<dyn StatusCallback>, Arc<std::sync::Mutex<Vec<StatusUpdate>>>) {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let callback = {
            let seen = Arc::clone(&seen);
            move |u: &StatusUpdate| -> Result<(), crate::error::CallbackError> {
                seen.lock().unwrap().push(u.clone());
                Ok(())
            }
        };
        (Arc::new(callback), seen)
    }

    #[tokio::test]
    async fn abandoned_submit_leaves_no_record() {
        let (callback, seen) = recording();
        let queue = QueueController::new(QueueConfig::default().with_capacity(1)).unwrap();
        queue.configure(upper(), callback).unwrap();

        let first = queue.submit("c", "s", "first").await.unwrap();
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            queue.submit("c", "s", "second"),
        )
        .await;
        assert!(blocked.is_err());

        let info = queue.info();
        assert_eq!(info.total_tracked, 1);
        assert_eq!(info.status_histogram.queued, 1);
        assert_eq!(info.queue_depth, 1);

        let abandoned: Vec<JobStatus> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.job_id != first)
            .map(|u| u.status)
            .collect();
        assert_eq!(abandoned, vec![JobStatus::Queued, JobStatus::Cancelled]);

        queue.start().await.unwrap();
        queue.wait(first, Duration::from_secs(5)).await.unwrap();
        assert_eq!(queue.info().total_tracked, 1);
        queue.stop().await;
    }

    #[tokio::test]
    async fn rejected_submit_reports_cancelled_with_reason() {
        let (callback, seen) = recording();
        let config = QueueConfig::default()
            .with_capacity(1)
            .with_enqueue_timeout(Duration::from_millis(20));
        let queue = QueueController::new(config).unwrap();
        queue.configure(upper(), callback).unwrap();

        let first = queue.submit("c", "s", "first").await.unwrap();
        let err = queue.submit("c", "s", "second").await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull { capacity: 1 }));

        let seen = seen.lock().unwrap();
        let rejected: Vec<&StatusUpdate> = seen.iter().filter(|u| u.job_id != first).collect();
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[1].status, JobStatus::Cancelled);
        assert_eq!(rejected[1].error.as_deref(), Some(err.to_string().as_str()));
        assert_eq!(queue.info().total_tracked, 1);
    }

    #[tokio::test]
    async fn stop_leaves_no_wake_ups_in_the_channel() {
        let queue = configured(QueueConfig::default().with_capacity(2));

        for _ in 0..20 {
            queue.start().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            queue.stop().await;
            assert_eq!(queue.info().queue_depth, 0);
        }

        // full capacity is available on the stopped queue
        queue.submit("c", "s", "a").await.unwrap();
        queue.submit("c", "s", "b").await.unwrap();
        assert_eq!(queue.info().queue_depth, 2);
    }
}
