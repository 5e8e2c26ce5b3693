//! Scheduler lifecycle integration tests.
//!
//! These tests drive jobs through the public service and a running scheduler:
//! pending -> downloading -> (converting) -> uploading -> completed

use std::sync::Arc;
use std::time::Duration;

use reelhaul_core::{
    testing::{fixtures, MockExecutor},
    ExecutionEvent, ExecutorError, JobRegistry, JobScheduler, JobService, JobSnapshot, SchedulerConfig,
};

/// Test helper wiring a registry, service and scheduler around a mock executor.
struct TestHarness {
    registry: Arc<JobRegistry>,
    service: JobService,
    scheduler: JobScheduler,
    executor: Arc<MockExecutor>,
}

impl TestHarness {
    fn new(executor: MockExecutor, max_concurrent_jobs: usize) -> Self {
        let registry = Arc::new(JobRegistry::new(0));
        let executor = Arc::new(executor);
        let config = SchedulerConfig {
            max_concurrent_jobs,
            poll_interval_ms: 20,
            cancel_timeout_ms: 150,
            max_finished_jobs: 0,
        };
        let scheduler = JobScheduler::new(config, Arc::clone(&registry), executor.clone());

        Self {
            service: JobService::new(Arc::clone(&registry)),
            registry,
            scheduler,
            executor,
        }
    }

    async fn create(&self) -> JobSnapshot {
        self.service
            .create_video_download_job(fixtures::video_request("https://x/video"))
            .await
            .expect("Failed to create job")
    }

    /// Polls until the job reaches `status`, panicking after ~3 seconds.
    async fn wait_for(&self, id: &str, status: &str) -> JobSnapshot {
        for _ in 0..300 {
            let job = self.service.get_job(id).await.expect("job exists");
            if job.status == status {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let job = self.service.get_job(id).await.expect("job exists");
        panic!("job {} stuck in {} waiting for {}", id, job.status, status);
    }
}

#[tokio::test]
async fn test_job_completes_with_download_urls() {
    let harness = TestHarness::new(MockExecutor::new(), 2);
    let job = harness.create().await;
    assert_eq!(job.status, "pending");

    harness.scheduler.start().await;
    let job = harness.wait_for(&job.id, "completed").await;

    assert_eq!(job.title.as_deref(), Some("Mock video"));
    assert!(!job.download_urls.unwrap_or_default().is_empty());
    assert_eq!(job.progress, Some(100.0));
    assert!(harness.registry.queue_snapshot().await.is_empty());

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_clip_job_completes() {
    let harness = TestHarness::new(MockExecutor::new(), 1);
    let job = harness
        .service
        .create_video_download_job(fixtures::clip_request(
            "https://x/video",
            "00:00:05",
            "00:00:15",
        ))
        .await
        .unwrap();

    harness.scheduler.start().await;
    harness.wait_for(&job.id, "completed").await;

    let requests = harness.executor.recorded_executions().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].kind.time_range().is_some());

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_clip_job_without_conversion_fails() {
    let executor = MockExecutor::new().with_events(vec![
        ExecutionEvent::Progress { percent: 100.0 },
        ExecutionEvent::UploadStarted,
        ExecutionEvent::Uploaded {
            urls: vec!["https://cdn/untrimmed.mp4".to_string()],
        },
    ]);
    let harness = TestHarness::new(executor, 1);
    let job = harness
        .service
        .create_video_download_job(fixtures::clip_request(
            "https://x/video",
            "00:00:05",
            "00:00:15",
        ))
        .await
        .unwrap();

    harness.scheduler.start().await;
    let job = harness.wait_for(&job.id, "failed").await;

    assert_eq!(job.error.as_deref(), Some("converting stage not reported"));
    assert_eq!(harness.executor.execution_count().await, 1);

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_cancel_pending_job_never_spawns() {
    let harness = TestHarness::new(MockExecutor::new(), 1);
    let job = harness.create().await;
    assert_eq!(harness.registry.queue_snapshot().await.len(), 1);

    let cancelled = harness.service.cancel_job(&job.id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert!(harness.registry.queue_snapshot().await.is_empty());

    harness.scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(harness.executor.execution_count().await, 0);
    assert_eq!(
        harness.service.get_job(&job.id).await.unwrap().status,
        "cancelled"
    );
    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_single_slot_runs_jobs_in_order() {
    let harness = TestHarness::new(
        MockExecutor::new().with_delay(Duration::from_millis(200)),
        1,
    );
    let a = harness.create().await;
    let b = harness.create().await;

    harness.scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let a_now = harness.service.get_job(&a.id).await.unwrap();
    let b_now = harness.service.get_job(&b.id).await.unwrap();
    assert!(
        ["downloading", "uploading"].contains(&a_now.status.as_str()),
        "A should be running, was {}",
        a_now.status
    );
    assert_eq!(b_now.status, "pending");

    harness.wait_for(&a.id, "completed").await;
    harness.wait_for(&b.id, "completed").await;

    let order: Vec<String> = harness
        .executor
        .recorded_executions()
        .await
        .into_iter()
        .map(|r| r.job_id)
        .collect();
    assert_eq!(order, vec![a.id, b.id]);

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let harness = TestHarness::new(
        MockExecutor::new().with_delay(Duration::from_millis(40)),
        3,
    );
    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(harness.create().await.id);
    }

    harness.scheduler.start().await;
    for _ in 0..50 {
        assert!(harness.registry.counts().await.in_progress <= 3);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for id in &ids {
        harness.wait_for(id, "completed").await;
    }

    assert_eq!(harness.executor.execution_count().await, 10);
    assert!(harness.executor.peak_concurrency() <= 3);
    assert!(harness.executor.peak_concurrency() >= 2);

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_failure_does_not_affect_other_jobs() {
    let harness = TestHarness::new(MockExecutor::new(), 1);
    harness
        .executor
        .set_next_error(ExecutorError::stage_failed("download", "HTTP Error 404"))
        .await;

    let failing = harness.create().await;
    let healthy = harness.create().await;

    harness.scheduler.start().await;
    let failed = harness.wait_for(&failing.id, "failed").await;
    assert_eq!(failed.error.as_deref(), Some("download failed: HTTP Error 404"));
    assert!(failed.download_urls.is_none());

    harness.wait_for(&healthy.id, "completed").await;
    assert_eq!(harness.executor.execution_count().await, 2);

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_cancel_running_job_reaches_cancelled() {
    let harness = TestHarness::new(MockExecutor::new().with_hang(), 1);
    let running = harness.create().await;
    let waiting = harness.create().await;

    harness.scheduler.start().await;
    harness.wait_for(&running.id, "downloading").await;

    let cancelling = harness.service.cancel_job(&running.id).await.unwrap();
    assert_eq!(cancelling.status, "cancelling");

    harness.wait_for(&running.id, "cancelled").await;
    // The freed slot goes to the next job.
    harness.wait_for(&waiting.id, "downloading").await;

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_unresponsive_execution_is_forced_to_cancelled() {
    let harness = TestHarness::new(MockExecutor::new().with_hang().ignoring_terminate(), 1);
    let job = harness.create().await;

    harness.scheduler.start().await;
    harness.wait_for(&job.id, "downloading").await;

    let started = tokio::time::Instant::now();
    harness.service.cancel_job(&job.id).await.unwrap();
    harness.wait_for(&job.id, "cancelled").await;

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(harness.registry.counts().await.in_progress, 0);

    harness.scheduler.stop().await;
}

#[tokio::test]
async fn test_cancel_finished_job_is_invalid() {
    let harness = TestHarness::new(MockExecutor::new(), 1);
    let job = harness.create().await;

    harness.scheduler.start().await;
    harness.wait_for(&job.id, "completed").await;

    let err = harness.service.cancel_job(&job.id).await.unwrap_err();
    assert!(matches!(err, reelhaul_core::JobError::InvalidState { .. }));

    harness.scheduler.stop().await;
}
