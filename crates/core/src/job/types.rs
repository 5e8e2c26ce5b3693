//! Job data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier.
pub type JobId = String;

/// A clip window inside the source media, both ends as `HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    /// Parses an `HH:MM:SS` timestamp into seconds.
    ///
    /// Hours may exceed 23 (long streams); minutes and seconds must be below 60.
    pub fn parse_timestamp(value: &str) -> Option<u32> {
        let mut parts = value.split(':');
        let (h, m, s) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        if [h, m, s]
            .iter()
            .any(|p| p.len() != 2 || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }
        let (h, m, s): (u32, u32, u32) = (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?);
        if m >= 60 || s >= 60 {
            return None;
        }
        Some(h * 3600 + m * 60 + s)
    }

    /// Start offset in seconds, if well-formed.
    pub fn start_secs(&self) -> Option<u32> {
        Self::parse_timestamp(&self.start)
    }

    /// End offset in seconds, if well-formed.
    pub fn end_secs(&self) -> Option<u32> {
        Self::parse_timestamp(&self.end)
    }
}

/// What a job does. Each kind defines its own stage sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// Fetch a video from a URL, optionally trimmed to a time range.
    VideoDownload {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_range: Option<TimeRange>,
    },
}

impl JobKind {
    /// Discriminator exposed in API responses.
    pub fn type_name(&self) -> &'static str {
        match self {
            JobKind::VideoDownload { .. } => "video_download",
        }
    }

    /// Source URL of the job.
    pub fn url(&self) -> &str {
        match self {
            JobKind::VideoDownload { url, .. } => url,
        }
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        match self {
            JobKind::VideoDownload { time_range, .. } => time_range.as_ref(),
        }
    }

    /// Active stages this kind passes through, in order.
    pub fn stages(&self) -> Vec<JobStatus> {
        match self {
            JobKind::VideoDownload { time_range, .. } => {
                let mut stages = vec![JobStatus::Downloading];
                if time_range.is_some() {
                    stages.push(JobStatus::Converting);
                }
                stages.push(JobStatus::Uploading);
                stages
            }
        }
    }

    /// Stage that must follow `current`, or `None` after the last one.
    pub fn next_stage(&self, current: &JobStatus) -> Option<JobStatus> {
        let stages = self.stages();
        let position = stages.iter().position(|stage| stage == current)?;
        stages.into_iter().nth(position + 1)
    }
}

/// Current status of a job.
///
/// State machine flow:
/// ```text
/// Pending -> Downloading -> [Converting] -> Uploading -> Completed
///    |            |               |             |
///    v            +------> Failed / Cancelling -+---> Cancelled
/// Cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered and waiting in the queue.
    Pending,
    /// Fetching the source media.
    Downloading,
    /// Trimming to the requested time range.
    Converting,
    /// Publishing the artifacts.
    Uploading,
    Completed,
    Failed { error: String },
    /// Termination requested, waiting for the executor to confirm.
    Cancelling,
    Cancelled,
}

impl JobStatus {
    /// Short name for logs and metrics labels.
    pub fn state_type(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Converting => "converting",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed { .. } => "failed",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }

    /// Returns true while the job occupies a scheduler slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Downloading
                | JobStatus::Converting
                | JobStatus::Uploading
                | JobStatus::Cancelling
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: &JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Downloading) | (Pending, Cancelled) => true,
            (Downloading, Converting) | (Downloading, Uploading) => true,
            (Converting, Uploading) => true,
            (Uploading, Completed) => true,
            (Downloading | Converting | Uploading, Failed { .. }) => true,
            (Downloading | Converting | Uploading, Cancelling) => true,
            (Cancelling, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.state_type())
    }
}

/// A job record as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub title: Option<String>,
    pub description: Option<String>,
    pub download_urls: Vec<String>,
    /// Download progress in percent, as last reported by the executor.
    pub progress_pct: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a new pending job with a fresh id.
    pub fn new(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: JobStatus::Pending,
            title: None,
            description: None,
            download_urls: Vec::new(),
            progress_pct: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Moves the job to `next` if the state machine allows it.
    ///
    /// Returns false (and leaves the job untouched) otherwise.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(&next) {
            return false;
        }
        let now = Utc::now();
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot::from(self)
    }
}

/// Client-facing view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    pub url: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        let error = match &job.status {
            JobStatus::Failed { error } => Some(error.clone()),
            _ => None,
        };
        Self {
            id: job.id.clone(),
            url: job.kind.url().to_string(),
            job_type: job.kind.type_name().to_string(),
            status: job.status.state_type().to_string(),
            title: job.title.clone(),
            description: job.description.clone(),
            time_range: job.kind.time_range().cloned(),
            download_urls: if job.download_urls.is_empty() {
                None
            } else {
                Some(job.download_urls.clone())
            },
            error,
            progress: job.progress_pct,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Input for creating a video download job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub url: String,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}
