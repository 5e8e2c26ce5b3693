//! Job scheduler implementation.
//!
//! One dispatch loop drains the queue into free slots. Each dispatched job
//! gets its own supervisor task that owns the execution and reports back to
//! the registry exactly once.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::executor::{termination_requested, ExecutionOutput, ExecutorError, JobExecutor};
use crate::job::{Dispatch, ExecutionOutcome, JobRegistry};
use crate::metrics;

use super::config::SchedulerConfig;
use super::types::SchedulerStatus;

/// Buffer for events flowing from an execution to its supervisor.
const EVENT_BUFFER_SIZE: usize = 64;

/// How often `stop` re-checks for running jobs while waiting for them.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Dispatches queued jobs to the executor.
pub struct JobScheduler {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    executor: Arc<dyn JobExecutor>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl JobScheduler {
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<JobRegistry>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            executor,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the scheduler (spawns the dispatch loop).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!(
            "Starting job scheduler (executor: {}, max concurrent jobs: {})",
            self.executor.name(),
            self.config.max_concurrent_jobs
        );
        self.spawn_dispatch_loop();
    }

    /// Stop the scheduler.
    ///
    /// Nothing new is dispatched afterwards. Running jobs are asked to
    /// terminate and end `Cancelled`; queued jobs stay queued.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping job scheduler");
        let _ = self.shutdown_tx.send(());

        // A dispatch racing the shutdown signal can still start a job, so
        // keep cancelling whatever shows up until nothing is in progress.
        let deadline = Duration::from_millis(self.config.cancel_timeout_ms) + Duration::from_secs(1);
        let wait = async {
            let mut cancelled = HashSet::new();
            loop {
                let running = self.registry.in_progress_ids().await;
                if running.is_empty() {
                    break;
                }
                for job_id in running {
                    if cancelled.contains(&job_id) {
                        continue;
                    }
                    if let Err(e) = self.registry.cancel(&job_id).await {
                        debug!("Job {} not cancelled on shutdown: {}", job_id, e);
                    }
                    cancelled.insert(job_id);
                }
                tokio::time::sleep(STOP_POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(deadline, wait).await.is_err() {
            warn!("Jobs still running after scheduler shutdown");
        }

        info!("Job scheduler stopped");
    }

    /// Get current scheduler status.
    pub async fn status(&self) -> SchedulerStatus {
        let counts = self.registry.counts().await;
        SchedulerStatus {
            running: self.running.load(Ordering::Relaxed),
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            in_progress: counts.in_progress,
            queued: counts.queued,
            paused: self.registry.in_maintenance().await,
        }
    }

    /// Dispatches as many queued jobs as there are free slots.
    ///
    /// Returns the number of jobs started.
    pub async fn dispatch_pending(&self) -> usize {
        Self::drain_queue(&self.registry, &self.executor, &self.config, || true).await
    }

    /// Spawn the dispatch loop task.
    fn spawn_dispatch_loop(&self) {
        let running = Arc::clone(&self.running);
        let registry = Arc::clone(&self.registry);
        let executor = Arc::clone(&self.executor);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Dispatch loop started");
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                Self::drain_queue(&registry, &executor, &config, || {
                    running.load(Ordering::SeqCst)
                })
                .await;

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Dispatch loop received shutdown signal");
                        break;
                    }
                    _ = registry.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {}
                }
            }
            info!("Dispatch loop stopped");
        });
    }

    async fn drain_queue(
        registry: &Arc<JobRegistry>,
        executor: &Arc<dyn JobExecutor>,
        config: &SchedulerConfig,
        keep_going: impl Fn() -> bool,
    ) -> usize {
        let mut started = 0;
        while keep_going() {
            let Some(dispatch) = registry.start_next(config.max_concurrent_jobs).await else {
                break;
            };
            info!("Starting job {} ({})", dispatch.job.id, dispatch.job.job_type);
            let registry = Arc::clone(registry);
            let executor = Arc::clone(executor);
            let cancel_timeout = Duration::from_millis(config.cancel_timeout_ms);
            tokio::spawn(Self::supervise(registry, executor, cancel_timeout, dispatch));
            started += 1;
        }
        started
    }

    /// Owns one execution from dispatch until the registry records its end.
    async fn supervise(
        registry: Arc<JobRegistry>,
        executor: Arc<dyn JobExecutor>,
        cancel_timeout: Duration,
        dispatch: Dispatch,
    ) {
        let Dispatch {
            job,
            request,
            terminate,
        } = dispatch;
        let job_id = job.id;

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let mut cancel_rx = terminate.clone();
        let mut execution =
            tokio::spawn(async move { executor.execute(request, events_tx, terminate).await });

        let mut events_open = true;
        let outcome = loop {
            tokio::select! {
                event = events_rx.recv(), if events_open => match event {
                    Some(event) => registry.apply_event(&job_id, event).await,
                    None => events_open = false,
                },
                result = &mut execution => {
                    while let Ok(event) = events_rx.try_recv() {
                        registry.apply_event(&job_id, event).await;
                    }
                    break Self::outcome_of(&job_id, result);
                }
                _ = termination_requested(&mut cancel_rx) => {
                    debug!("Job {}: waiting up to {:?} for termination", job_id, cancel_timeout);
                    match tokio::time::timeout(cancel_timeout, &mut execution).await {
                        Ok(_) => debug!("Job {}: execution stopped", job_id),
                        Err(_) => {
                            warn!(
                                "Job {}: execution ignored termination for {:?}, aborting",
                                job_id, cancel_timeout
                            );
                            execution.abort();
                            metrics::FORCED_TERMINATIONS.inc();
                        }
                    }
                    break ExecutionOutcome::Terminated;
                }
            }
        };

        registry.finish(&job_id, outcome).await;
    }

    fn outcome_of(
        job_id: &str,
        result: Result<Result<ExecutionOutput, ExecutorError>, JoinError>,
    ) -> ExecutionOutcome {
        match result {
            Ok(Ok(output)) => ExecutionOutcome::Succeeded(output),
            Ok(Err(ExecutorError::Terminated)) => ExecutionOutcome::Terminated,
            Ok(Err(e)) => {
                warn!("Job {} failed: {}", job_id, e);
                ExecutionOutcome::Failed(e.to_string())
            }
            Err(e) if e.is_panic() => {
                error!("Job {}: executor panicked", job_id);
                ExecutionOutcome::Failed("executor panicked".to_string())
            }
            Err(_) => ExecutionOutcome::Terminated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobKind, JobSnapshot};
    use crate::testing::MockExecutor;

    fn video_job() -> Job {
        Job::new(JobKind::VideoDownload {
            url: "https://example.com/watch?v=1".to_string(),
            time_range: None,
        })
    }

    fn scheduler_with(
        executor: Arc<MockExecutor>,
        max_concurrent_jobs: usize,
    ) -> (JobScheduler, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new(0));
        let config = SchedulerConfig {
            max_concurrent_jobs,
            poll_interval_ms: 20,
            cancel_timeout_ms: 200,
            max_finished_jobs: 0,
        };
        let scheduler = JobScheduler::new(config, Arc::clone(&registry), executor);
        (scheduler, registry)
    }

    async fn wait_for_status(registry: &JobRegistry, id: &str, expected: &str) -> JobSnapshot {
        for _ in 0..200 {
            let job = registry.get(id).await.unwrap();
            if job.status == expected {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "job {} never reached {}: {:?}",
            id,
            expected,
            registry.get(id).await
        );
    }

    #[test]
    fn test_outcome_of_maps_errors() {
        let ok = JobScheduler::outcome_of("j", Ok(Ok(ExecutionOutput::default())));
        assert!(matches!(ok, ExecutionOutcome::Succeeded(_)));

        let terminated = JobScheduler::outcome_of("j", Ok(Err(ExecutorError::Terminated)));
        assert!(matches!(terminated, ExecutionOutcome::Terminated));

        let failed = JobScheduler::outcome_of(
            "j",
            Ok(Err(ExecutorError::stage_failed("download", "HTTP 404"))),
        );
        match failed {
            ExecutionOutcome::Failed(msg) => assert_eq!(msg, "download failed: HTTP 404"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_respects_limit() {
        let executor = Arc::new(MockExecutor::new().with_hang());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 2);

        for _ in 0..3 {
            registry.register(video_job()).await.unwrap();
        }

        assert_eq!(scheduler.dispatch_pending().await, 2);
        assert_eq!(scheduler.dispatch_pending().await, 0);

        let counts = registry.counts().await;
        assert_eq!(counts.in_progress, 2);
        assert_eq!(counts.queued, 1);
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let executor = Arc::new(
            MockExecutor::new().with_download_urls(vec!["https://cdn/x.mp4".to_string()]),
        );
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 1);
        let job = registry.register(video_job()).await.unwrap();

        scheduler.start().await;
        let job = wait_for_status(&registry, &job.id, "completed").await;
        assert_eq!(job.download_urls, Some(vec!["https://cdn/x.mp4".to_string()]));
        assert_eq!(executor.execution_count().await, 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_executor_failure_marks_job_failed() {
        let executor = Arc::new(MockExecutor::new());
        executor
            .set_next_error(ExecutorError::stage_failed("download", "HTTP Error 403"))
            .await;
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 1);
        let job = registry.register(video_job()).await.unwrap();

        scheduler.start().await;
        let job = wait_for_status(&registry, &job.id, "failed").await;
        assert_eq!(job.error.as_deref(), Some("download failed: HTTP Error 403"));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_running_job_cooperative() {
        let executor = Arc::new(MockExecutor::new().with_hang());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 1);
        let job = registry.register(video_job()).await.unwrap();

        assert_eq!(scheduler.dispatch_pending().await, 1);
        let snapshot = registry.cancel(&job.id).await.unwrap();
        assert_eq!(snapshot.status, "cancelling");

        wait_for_status(&registry, &job.id, "cancelled").await;
        assert_eq!(registry.counts().await.in_progress, 0);
    }

    #[tokio::test]
    async fn test_cancel_forces_unresponsive_execution() {
        let executor = Arc::new(MockExecutor::new().with_hang().ignoring_terminate());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 1);
        let job = registry.register(video_job()).await.unwrap();

        assert_eq!(scheduler.dispatch_pending().await, 1);
        registry.cancel(&job.id).await.unwrap();

        wait_for_status(&registry, &job.id, "cancelled").await;
        assert_eq!(registry.counts().await.in_progress, 0);
    }

    #[tokio::test]
    async fn test_stop_cancels_running_jobs() {
        let executor = Arc::new(MockExecutor::new().with_hang());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 1);
        let running = registry.register(video_job()).await.unwrap();
        let queued = registry.register(video_job()).await.unwrap();

        scheduler.start().await;
        wait_for_status(&registry, &running.id, "downloading").await;
        scheduler.stop().await;

        assert_eq!(registry.get(&running.id).await.unwrap().status, "cancelled");
        assert_eq!(registry.get(&queued.id).await.unwrap().status, "pending");
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn test_stop_cancels_job_dispatched_during_shutdown() {
        let executor = Arc::new(MockExecutor::new().with_hang());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 2);
        let first = registry.register(video_job()).await.unwrap();

        scheduler.start().await;
        wait_for_status(&registry, &first.id, "downloading").await;

        // The second job starts after `stop` has cancelled what it saw.
        let (_, late) = tokio::join!(scheduler.stop(), async {
            let late = registry.register(video_job()).await.unwrap();
            assert_eq!(scheduler.dispatch_pending().await, 1);
            late
        });

        assert_eq!(registry.get(&first.id).await.unwrap().status, "cancelled");
        assert_eq!(registry.get(&late.id).await.unwrap().status, "cancelled");
        assert_eq!(registry.counts().await.in_progress, 0);
    }

    #[tokio::test]
    async fn test_stopped_loop_leaves_queue_alone() {
        let executor = Arc::new(MockExecutor::new().with_hang());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 4);

        scheduler.start().await;
        scheduler.stop().await;
        let queued = registry.register(video_job()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(registry.get(&queued.id).await.unwrap().status, "pending");
        assert_eq!(executor.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_maintenance_blocks_dispatch() {
        let executor = Arc::new(MockExecutor::new());
        let (scheduler, registry) = scheduler_with(Arc::clone(&executor), 1);
        registry.register(video_job()).await.unwrap();

        assert!(registry.try_begin_maintenance().await);
        assert_eq!(scheduler.dispatch_pending().await, 0);
        assert!(scheduler.status().await.paused);

        registry.end_maintenance().await;
        assert_eq!(scheduler.dispatch_pending().await, 1);
    }
}
