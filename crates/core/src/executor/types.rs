//! Types exchanged between the scheduler and an executor.

use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobKind};

/// Everything an executor needs to run one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub job_id: JobId,
    pub kind: JobKind,
}

/// Stage transitions reported while a job runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Result of the metadata probe.
    Metadata {
        title: Option<String>,
        description: Option<String>,
    },
    /// Download progress in percent.
    Progress { percent: f32 },
    ConversionStarted,
    ConversionFinished,
    UploadStarted,
    /// Final artifact URLs.
    Uploaded { urls: Vec<String> },
}

/// Successful result of an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub download_urls: Vec<String>,
}
