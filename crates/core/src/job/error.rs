//! Error types for job operations.

use thiserror::Error;

/// Errors surfaced synchronously to callers of the job API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Malformed request (bad url, invalid time range).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown job id.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Operation is not allowed for the job's current status.
    #[error("cannot {operation} job {job_id}: current status is {status}")]
    InvalidState {
        job_id: String,
        status: String,
        operation: String,
    },
}

impl JobError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn invalid_state(
        job_id: impl Into<String>,
        status: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            job_id: job_id.into(),
            status: status.into(),
            operation: operation.into(),
        }
    }
}
