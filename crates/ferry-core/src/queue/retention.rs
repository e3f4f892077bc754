//! Retention sweeper: bounds how many finished records the Job Table keeps.

use chrono::{DateTime, Utc};

use crate::domain::JobId;
use crate::error::ConfigError;

/// When and how far to trim finished records.
///
/// Once the table tracks more than `high_watermark` records, the oldest
/// terminal records (by completion time) are evicted until `low_watermark`
/// terminal records remain. Queued and Processing records are never evicted,
/// however many there are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub high_watermark: usize,
    pub low_watermark: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::with_high_watermark(100)
    }
}

impl RetentionPolicy {
    pub fn new(high_watermark: usize, low_watermark: usize) -> Self {
        Self {
            high_watermark,
            low_watermark,
        }
    }

    /// High watermark with the low watermark at half of it.
    pub fn with_high_watermark(high_watermark: usize) -> Self {
        Self::new(high_watermark, high_watermark / 2)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low_watermark > self.high_watermark {
            return Err(ConfigError::InvalidWatermarks {
                low: self.low_watermark,
                high: self.high_watermark,
            });
        }
        Ok(())
    }

    /// Pick the records to evict.
    ///
    /// `finished` holds every terminal record as
    /// `(completed_at, finish sequence, id)`; the sequence breaks ties between
    /// identical timestamps. Returns oldest first.
    pub fn select_evictions(
        &self,
        tracked: usize,
        mut finished: Vec<(DateTime<Utc>, u64, JobId)>,
    ) -> Vec<JobId> {
        if tracked <= self.high_watermark || finished.len() <= self.low_watermark {
            return Vec::new();
        }
        finished.sort_unstable_by_key(|&(at, seq, _)| (at, seq));
        let excess = finished.len() - self.low_watermark;
        finished.into_iter().take(excess).map(|(_, _, id)| id).collect()
    }
}
