//! MessageProcessor port - the unit of work a worker runs for each job.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessingError;

/// Processes one submitted message.
///
/// Called concurrently from several workers with different arguments, so
/// implementations must be `Send + Sync`. Retries, if any, are the
/// implementation's business: the queue records the first returned error.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(
        &self,
        correlation_key: &str,
        submitter_key: &str,
        payload: &str,
    ) -> Result<serde_json::Value, ProcessingError>;
}

/// Adapts a synchronous function into a `MessageProcessor`.
///
/// The function runs on tokio's blocking pool, so it may do blocking I/O
/// (HTTP clients, sleeps) without stalling the runtime.
///
/// # Example
/// ```ignore
/// let upper = BlockingProcessor::new(|_conv, _sess, msg| {
///     Ok(serde_json::Value::String(msg.to_uppercase()))
/// });
/// ```
pub struct BlockingProcessor<F> {
    f: Arc<F>,
}

impl<F> BlockingProcessor<F>
where
    F: Fn(&str, &str, &str) -> Result<serde_json::Value, ProcessingError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> MessageProcessor for BlockingProcessor<F>
where
    F: Fn(&str, &str, &str) -> Result<serde_json::Value, ProcessingError> + Send + Sync + 'static,
{
    async fn process(
        &self,
        correlation_key: &str,
        submitter_key: &str,
        payload: &str,
    ) -> Result<serde_json::Value, ProcessingError> {
        let f = Arc::clone(&self.f);
        let (c, s, p) = (
            correlation_key.to_owned(),
            submitter_key.to_owned(),
            payload.to_owned(),
        );
        tokio::task::spawn_blocking(move || f(&c, &s, &p))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ProcessingError::Panicked(panic_message(e.into_panic()))
                } else {
                    ProcessingError::Aborted
                }
            })?
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
