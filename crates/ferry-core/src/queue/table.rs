//! Job Table: the single source of truth for job state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::RetentionPolicy;
use crate::domain::{JobId, JobRecord, JobStatus, StatusUpdate};
use crate::error::{ProcessingError, TransitionError};
use crate::observability::StatusCounts;

struct Entry {
    record: JobRecord,
    /// Order in which the record became terminal.
    finished_seq: Option<u64>,
}

/// Outcome of a worker trying to claim a dequeued id.
#[derive(Debug)]
pub enum Claim {
    /// The record moved to Processing; the worker now owns it.
    Started(JobRecord),
    /// No record under this id (evicted or reset).
    Missing,
    /// The record is not Queued (cancelled before pickup).
    NotQueued(JobStatus),
}

/// Records plus the worker bookkeeping guarded by the same lock.
///
/// Design:
/// - The channel carries ids only; every state change happens here.
/// - Callers hold the lock for single map operations, never across an
///   `.await`, the processing call, or the status callback.
#[derive(Default)]
pub struct JobTable {
    entries: HashMap<JobId, Entry>,
    active_workers: usize,
    running: bool,
    next_finished_seq: u64,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: JobRecord) {
        self.entries.insert(
            record.id,
            Entry {
                record,
                finished_seq: None,
            },
        );
    }

    pub fn remove(&mut self, id: &JobId) -> Option<JobRecord> {
        self.entries.remove(id).map(|e| e.record)
    }

    pub fn get(&self, id: &JobId) -> Option<&JobRecord> {
        self.entries.get(id).map(|e| &e.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Queued -> Processing, counting the worker as active.
    pub fn claim(&mut self, id: &JobId, now: DateTime<Utc>) -> Claim {
        let Some(entry) = self.entries.get_mut(id) else {
            return Claim::Missing;
        };
        if entry.record.start(now).is_err() {
            return Claim::NotQueued(entry.record.status);
        }
        self.active_workers += 1;
        Claim::Started(entry.record.clone())
    }

    /// Record the processing outcome and release the worker slot.
    ///
    /// The slot is released even when the record is gone or the transition is
    /// rejected, so `active_workers` always returns to a consistent value.
    pub fn finish(
        &mut self,
        id: &JobId,
        outcome: Result<serde_json::Value, ProcessingError>,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusUpdate>, TransitionError> {
        self.active_workers = self.active_workers.saturating_sub(1);

        let Some(entry) = self.entries.get_mut(id) else {
            return Ok(None);
        };
        match outcome {
            Ok(result) => entry.record.complete(result, now)?,
            Err(err) => entry.record.fail(err.to_string(), now)?,
        }
        entry.finished_seq = Some(self.next_finished_seq);
        self.next_finished_seq += 1;
        Ok(Some(StatusUpdate::from_record(&entry.record)))
    }

    /// Queued -> Cancelled. False for unknown ids and any other status.
    pub fn cancel(&mut self, id: &JobId, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        if entry.record.cancel(now).is_err() {
            return false;
        }
        entry.finished_seq = Some(self.next_finished_seq);
        self.next_finished_seq += 1;
        true
    }

    pub fn counts(&self) -> StatusCounts {
        self.entries.values().map(|e| e.record.status).collect()
    }

    /// Evict old terminal records according to `policy`.
    pub fn sweep(&mut self, policy: &RetentionPolicy) -> Vec<JobId> {
        if self.entries.len() <= policy.high_watermark {
            return Vec::new();
        }
        let finished = self
            .entries
            .values()
            .filter(|e| e.record.is_terminal())
            .filter_map(|e| {
                let at = e.record.completed_at?;
                Some((at, e.finished_seq.unwrap_or(0), e.record.id))
            })
            .collect();

        let evicted = policy.select_evictions(self.entries.len(), finished);
        for id in &evicted {
            self.entries.remove(id);
        }
        evicted
    }

    /// Drop every record (queue-wide reset).
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn queued(table: &mut JobTable) -> JobId {
        let id = JobId::from_ulid(Ulid::new());
        table.insert(JobRecord::new(id, "conv", "sess", "msg", at(0)));
        id
    }

    fn run_to_completion(table: &mut JobTable, id: &JobId, secs: i64) {
        assert!(matches!(table.claim(id, at(secs)), Claim::Started(_)));
        table
            .finish(id, Ok(serde_json::json!("ok")), at(secs))
            .unwrap();
    }

    #[test]
    fn claim_counts_active_and_finish_releases() {
        let mut table = JobTable::new();
        let id = queued(&mut table);

        let Claim::Started(snapshot) = table.claim(&id, at(1)) else {
            panic!("expected Started");
        };
        assert_eq!(snapshot.status, JobStatus::Processing);
        assert_eq!(table.active_workers(), 1);

        let update = table
            .finish(&id, Err(ProcessingError::failed("nope")), at(2))
            .unwrap()
            .unwrap();
        assert_eq!(update.status, JobStatus::Failed);
        assert_eq!(update.error.as_deref(), Some("nope"));
        assert_eq!(table.active_workers(), 0);
    }

    #[test]
    fn claim_skips_cancelled_and_missing() {
        let mut table = JobTable::new();
        let id = queued(&mut table);
        assert!(table.cancel(&id, at(1)));

        assert!(matches!(
            table.claim(&id, at(2)),
            Claim::NotQueued(JobStatus::Cancelled)
        ));
        assert!(matches!(
            table.claim(&JobId::from_ulid(Ulid::new()), at(2)),
            Claim::Missing
        ));
        assert_eq!(table.active_workers(), 0);
    }

    #[test]
    fn cancel_rejects_processing_and_unknown() {
        let mut table = JobTable::new();
        let id = queued(&mut table);
        table.claim(&id, at(1));

        assert!(!table.cancel(&id, at(2)));
        assert_eq!(table.get(&id).unwrap().status, JobStatus::Processing);
        assert!(!table.cancel(&JobId::from_ulid(Ulid::new()), at(2)));
    }

    #[test]
    fn finish_on_missing_record_still_releases_slot() {
        let mut table = JobTable::new();
        let id = queued(&mut table);
        table.claim(&id, at(1));
        table.clear();

        assert_eq!(table.finish(&id, Ok(serde_json::json!(1)), at(2)), Ok(None));
        assert_eq!(table.active_workers(), 0);
    }

    #[test]
    fn sweep_keeps_newest_terminal_records() {
        let mut table = JobTable::new();
        let policy = RetentionPolicy::with_high_watermark(10);

        let ids: Vec<JobId> = (0..11)
            .map(|i| {
                let id = queued(&mut table);
                run_to_completion(&mut table, &id, i);
                id
            })
            .collect();

        let evicted = table.sweep(&policy);
        assert_eq!(evicted, ids[..6].to_vec());
        assert_eq!(table.len(), 5);
        for id in &ids[6..] {
            assert!(table.get(id).is_some());
        }
    }

    #[test]
    fn sweep_never_evicts_in_flight_records() {
        let mut table = JobTable::new();
        let policy = RetentionPolicy::with_high_watermark(4);

        let pending: Vec<JobId> = (0..6).map(|_| queued(&mut table)).collect();
        let done = queued(&mut table);
        run_to_completion(&mut table, &done, 1);

        assert!(table.sweep(&policy).is_empty());
        assert_eq!(table.len(), 7);
        for id in &pending {
            assert!(table.get(id).is_some());
        }
    }

    #[test]
    fn sweep_orders_equal_timestamps_by_finish_order() {
        let mut table = JobTable::new();
        let policy = RetentionPolicy::new(2, 1);

        let first = queued(&mut table);
        let second = queued(&mut table);
        let third = queued(&mut table);
        for id in [&first, &second, &third] {
            run_to_completion(&mut table, id, 5);
        }

        assert_eq!(table.sweep(&policy), vec![first, second]);
        assert!(table.get(&third).is_some());
    }

    #[test]
    fn counts_match_len() {
        let mut table = JobTable::new();
        let a = queued(&mut table);
        let b = queued(&mut table);
        queued(&mut table);
        table.cancel(&a, at(1));
        table.claim(&b, at(1));

        let counts = table.counts();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.total(), table.len());
    }
}
