//! Job identifiers.
//!
//! IDs are ULIDs: sortable by creation time, generated without coordination,
//! and rendered with a `job-` prefix so they are recognisable in logs and
//! HTTP payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

const PREFIX: &str = "job-";

/// Identifier of one submitted job (submit/status/cancel unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

/// Error returned when a string is not a valid `job-<ULID>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job id '{0}'")]
pub struct ParseJobIdError(String);

impl FromStr for JobId {
    type Err = ParseJobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|_| ParseJobIdError(s.to_string()))
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for JobId {
    type Error = ParseJobIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
