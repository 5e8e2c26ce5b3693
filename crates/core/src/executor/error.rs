//! Error types for executors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an executor. The scheduler records them on the job;
/// they never propagate further.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// An external program could not be found.
    #[error("executable not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// A stage (probe, download, convert, upload) failed.
    #[error("{stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },

    /// Execution stopped in response to a termination request.
    #[error("execution terminated")]
    Terminated,

    #[error("execution timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn stage_failed(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}
