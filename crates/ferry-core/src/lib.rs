//! ferry-core
//!
//! An in-process job queue for chat-style request handling: a bounded work
//! channel feeding a fixed pool of workers, a Job Table that tracks every
//! message through Queued -> Processing -> Completed/Failed (or Cancelled),
//! status callbacks on each transition, and retention of finished records.
//!
//! # Modules
//! - **domain**: ids, status state machine, job records, status updates
//! - **ports**: processor / callback / clock / id-generator traits
//! - **queue**: work channel, Job Table, retention, `QueueController`
//! - **worker**: the worker pool loop
//! - **runtime**: processor and callback invocation with failure isolation
//! - **observability**: `QueueInfo` snapshots
//! - **config** / **error**

pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use config::QueueConfig;
pub use domain::{JobId, JobRecord, JobStatus, StatusUpdate};
pub use error::{CallbackError, ConfigError, ProcessingError, QueueError};
pub use observability::{QueueInfo, StatusCounts};
pub use ports::{BlockingProcessor, MessageProcessor, NoopCallback, StatusCallback};
pub use queue::{QueueController, RetentionPolicy};
