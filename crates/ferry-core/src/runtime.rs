//! Runtime: invokes the configured processor and status callback.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::warn;

use crate::domain::{JobRecord, StatusUpdate};
use crate::error::ProcessingError;
use crate::ports::processor::panic_message;
use crate::ports::{MessageProcessor, NoopCallback, StatusCallback};

/// The capabilities installed by `QueueController::configure`.
///
/// Design:
/// - Built once at configuration time, then shared (cloned) by every worker.
/// - Neither call runs under the Job Table lock.
#[derive(Clone)]
pub struct Runtime {
    processor: Arc<dyn MessageProcessor>,
    callback: Arc<dyn StatusCallback>,
}

impl Runtime {
    pub fn new(processor: Arc<dyn MessageProcessor>, callback: Arc<dyn StatusCallback>) -> Self {
        Self {
            processor,
            callback,
        }
    }

    /// Runtime without a status callback.
    pub fn without_callback(processor: Arc<dyn MessageProcessor>) -> Self {
        Self::new(processor, Arc::new(NoopCallback))
    }

    /// Run the processor for one claimed record.
    ///
    /// The call runs in its own task so a panic surfaces as
    /// `ProcessingError::Panicked` instead of taking the worker down.
    pub async fn execute(&self, record: &JobRecord) -> Result<serde_json::Value, ProcessingError> {
        let processor = Arc::clone(&self.processor);
        let (conv, sess, payload) = (
            record.correlation_key.clone(),
            record.submitter_key.clone(),
            record.payload.clone(),
        );

        tokio::spawn(async move { processor.process(&conv, &sess, &payload).await })
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ProcessingError::Panicked(panic_message(e.into_panic()))
                } else {
                    ProcessingError::Aborted
                }
            })?
    }

    /// Deliver a status update. Failures are logged and swallowed.
    pub fn notify(&self, update: &StatusUpdate) {
        match catch_unwind(AssertUnwindSafe(|| self.callback.on_status(update))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(job = %update.job_id, status = %update.status, error = %e, "status callback failed");
            }
            Err(panic) => {
                warn!(
                    job = %update.job_id,
                    status = %update.status,
                    panic = %panic_message(panic),
                    "status callback panicked"
                );
            }
        }
    }
}
