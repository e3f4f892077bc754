//! Error types for the queue.
//!
//! - `QueueError`: returned to callers of the controller.
//! - `ProcessingError`: failure of the processing function; stored on the
//!   record as its `error` string, never returned to the submitter.
//! - `CallbackError`: failure of the status callback; logged and dropped.
//! - `TransitionError`: an illegal status move, rejected by `JobRecord`.
//! - `ConfigError`: invalid `QueueConfig`.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{JobId, JobStatus};

#[derive(Debug, Error)]
pub enum QueueError {
    /// The work channel stayed full for the whole enqueue timeout.
    #[error("queue full (capacity {capacity}), try again later")]
    QueueFull { capacity: usize },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("queue is not configured: call configure() first")]
    NotConfigured,

    #[error("cannot {0} while the queue is running")]
    Running(&'static str),

    #[error("timed out waiting for {0} to finish")]
    WaitTimeout(JobId),

    #[error("work channel closed")]
    ChannelClosed,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl QueueError {
    /// Transient errors the caller may retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::QueueFull { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    #[error("{0}")]
    Failed(String),

    #[error("processing panicked: {0}")]
    Panicked(String),

    #[error("processing was aborted")]
    Aborted,
}

impl ProcessingError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProcessingError::Failed(message.into())
    }
}

#[derive(Debug, Clone, Error)]
#[error("status callback failed: {0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition for {id}: {from} -> {to}")]
pub struct TransitionError {
    pub id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    #[error("invalid queue capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    #[error("invalid retention watermarks: low {low} must not exceed high {high}")]
    InvalidWatermarks { low: usize, high: usize },

    #[error("invalid {name} {value:?}: must be greater than zero")]
    ZeroTimeout { name: &'static str, value: Duration },
}
