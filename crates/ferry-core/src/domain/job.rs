//! Job record: identity + lifecycle state of one submitted message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobStatus};
use crate::error::TransitionError;

/// One unit of submitted work.
///
/// Design:
/// - The Job Table holds exactly one record per id; status queries return
///   clones of it.
/// - All state transitions go through the methods below, which validate the
///   move with `JobStatus::can_transition_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,

    /// Conversation id. Opaque to the queue.
    pub correlation_key: String,

    /// Session id. Opaque to the queue.
    pub submitter_key: String,

    /// The user message.
    pub payload: String,

    pub status: JobStatus,

    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the record reached a terminal state (including cancellation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Set only when Completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Set only when Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        correlation_key: impl Into<String>,
        submitter_key: impl Into<String>,
        payload: impl Into<String>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            correlation_key: correlation_key.into(),
            submitter_key: submitter_key.into(),
            payload: payload.into(),
            status: JobStatus::Queued,
            submitted_at,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Queued -> Processing.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Processing -> Completed.
    pub fn complete(
        &mut self,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Processing -> Failed.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Queued -> Cancelled. In-flight work cannot be cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
