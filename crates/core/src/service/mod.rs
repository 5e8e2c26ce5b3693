//! Public job API.
//!
//! [`JobService`] validates requests and delegates everything else to the
//! shared [`JobRegistry`]. The HTTP layer talks only to this type.

use std::sync::Arc;

use reqwest::Url;
use tracing::info;

use crate::job::{
    CreateJobRequest, Job, JobError, JobId, JobKind, JobRegistry, JobSnapshot, TimeRange,
};

/// Create, inspect and cancel jobs.
#[derive(Debug, Clone)]
pub struct JobService {
    registry: Arc<JobRegistry>,
}

impl JobService {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Validates the request, registers a pending video download job and
    /// returns its snapshot.
    pub async fn create_video_download_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<JobSnapshot, JobError> {
        let url = validate_url(&request.url)?;
        if let Some(range) = &request.time_range {
            validate_time_range(range)?;
        }

        let job = Job::new(JobKind::VideoDownload {
            url,
            time_range: request.time_range,
        });
        let snapshot = self.registry.register(job).await?;
        info!("Created video download job {} for {}", snapshot.id, snapshot.url);
        Ok(snapshot)
    }

    pub async fn get_job(&self, id: &str) -> Result<JobSnapshot, JobError> {
        self.registry.get(id).await
    }

    /// Cancels a queued or running job and returns its updated snapshot.
    pub async fn cancel_job(&self, id: &str) -> Result<JobSnapshot, JobError> {
        self.registry.cancel(id).await
    }

    pub async fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.registry.list().await
    }

    /// Pending job ids in dispatch order.
    pub async fn queue_snapshot(&self) -> Vec<JobId> {
        self.registry.queue_snapshot().await
    }
}

fn validate_url(raw: &str) -> Result<String, JobError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JobError::validation("url is required"));
    }
    let url =
        Url::parse(trimmed).map_err(|e| JobError::validation(format!("invalid url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(JobError::validation(format!(
            "unsupported url scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(JobError::validation("url has no host"));
    }
    Ok(trimmed.to_string())
}

fn validate_time_range(range: &TimeRange) -> Result<(), JobError> {
    let start = range.start_secs().ok_or_else(|| {
        JobError::validation(format!("invalid start time '{}', expected HH:MM:SS", range.start))
    })?;
    let end = range.end_secs().ok_or_else(|| {
        JobError::validation(format!("invalid end time '{}', expected HH:MM:SS", range.end))
    })?;
    if end <= start {
        return Err(JobError::validation("time range end must be after start"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JobService {
        JobService::new(Arc::new(JobRegistry::new(0)))
    }

    fn request(url: &str, range: Option<(&str, &str)>) -> CreateJobRequest {
        CreateJobRequest {
            url: url.to_string(),
            time_range: range.map(|(start, end)| TimeRange {
                start: start.to_string(),
                end: end.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_create_job_is_pending_and_queued() {
        let service = service();
        let job = service
            .create_video_download_job(request("https://x/video", None))
            .await
            .unwrap();

        assert_eq!(job.status, "pending");
        assert_eq!(job.job_type, "video_download");
        assert_eq!(job.url, "https://x/video");
        assert_eq!(service.queue_snapshot().await, vec![job.id.clone()]);
        assert_eq!(service.get_job(&job.id).await.unwrap().id, job.id);
    }

    #[tokio::test]
    async fn test_create_job_with_time_range() {
        let job = service()
            .create_video_download_job(request("https://x/video", Some(("00:00:05", "00:01:00"))))
            .await
            .unwrap();
        let range = job.time_range.unwrap();
        assert_eq!(range.start, "00:00:05");
        assert_eq!(range.end, "00:01:00");
    }

    #[tokio::test]
    async fn test_rejects_bad_urls() {
        let service = service();
        for url in ["", "   ", "not a url", "ftp://x/video", "file:///etc/passwd"] {
            let err = service
                .create_video_download_job(request(url, None))
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::Validation(_)), "{url}: {err:?}");
        }
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_time_ranges() {
        let service = service();
        for (start, end) in [
            ("00:00:10", "00:00:10"),
            ("00:01:00", "00:00:30"),
            ("0:00:10", "00:00:20"),
            ("00:60:00", "01:00:00"),
            ("00:00:10", "later"),
        ] {
            let err = service
                .create_video_download_job(request("https://x/video", Some((start, end))))
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::Validation(_)), "{start}-{end}");
        }
        assert!(service.queue_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let err = service().get_job("missing").await.unwrap_err();
        assert_eq!(err, JobError::NotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_pending_then_again() {
        let service = service();
        let job = service
            .create_video_download_job(request("https://x/video", None))
            .await
            .unwrap();

        let cancelled = service.cancel_job(&job.id).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");
        assert!(service.queue_snapshot().await.is_empty());

        let err = service.cancel_job(&job.id).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidState { .. }));
    }
}
