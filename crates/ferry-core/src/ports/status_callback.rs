//! StatusCallback port - observer of job status transitions.

use crate::domain::StatusUpdate;
use crate::error::CallbackError;

/// Receives one notification per status transition
/// (Queued, Processing, and the terminal state).
///
/// A submit that is rejected (`QueueFull`) or abandoned by its caller still
/// delivers `Queued`, followed by `Cancelled` with the reason in `error`; the
/// id is no longer tracked after that.
///
/// Invoked without any queue lock held, so implementations may block briefly
/// or query the controller. Errors and panics are logged by the queue and
/// otherwise ignored.
pub trait StatusCallback: Send + Sync {
    fn on_status(&self, update: &StatusUpdate) -> Result<(), CallbackError>;
}

impl<F> StatusCallback for F
where
    F: Fn(&StatusUpdate) -> Result<(), CallbackError> + Send + Sync,
{
    fn on_status(&self, update: &StatusUpdate) -> Result<(), CallbackError> {
        self(update)
    }
}

/// Callback that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

impl StatusCallback for NoopCallback {
    fn on_status(&self, _update: &StatusUpdate) -> Result<(), CallbackError> {
        Ok(())
    }
}
