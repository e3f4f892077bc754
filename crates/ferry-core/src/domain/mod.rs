//! Domain model (ids, status, records, notifications).

pub mod ids;
pub mod job;
pub mod status;
pub mod update;

pub use ids::{JobId, ParseJobIdError};
pub use job::JobRecord;
pub use status::JobStatus;
pub use update::StatusUpdate;
