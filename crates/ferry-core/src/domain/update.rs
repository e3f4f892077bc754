//! Status notifications delivered to the status callback.

use serde::{Deserialize, Serialize};

use super::{JobId, JobRecord, JobStatus};

/// One status transition of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            result: None,
            error: None,
        }
    }

    /// Snapshot the outcome fields of a record.
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id,
            status: record.status,
            result: record.result.clone(),
            error: record.error.clone(),
        }
    }
}
