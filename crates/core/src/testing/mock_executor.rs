//! Mock executor for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};

use crate::executor::{
    termination_requested, ExecutionEvent, ExecutionOutput, ExecutionRequest, ExecutorError,
    JobExecutor,
};

/// Decrements the active counter even when the execution is aborted.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of the JobExecutor trait.
///
/// Provides controllable behavior for testing:
/// - Record every request for assertions
/// - Emit a scripted sequence of stage events
/// - Simulate failure, slow runs, or executions that never finish
/// - Track how many executions overlap
///
/// # Example
///
/// ```rust,ignore
/// use reelhaul_core::testing::MockExecutor;
///
/// let executor = Arc::new(MockExecutor::new().with_delay(Duration::from_millis(50)));
/// executor.set_next_error(ExecutorError::stage_failed("download", "HTTP 404")).await;
///
/// let scheduler = JobScheduler::new(config, registry, executor.clone());
/// // ...
/// assert_eq!(executor.peak_concurrency(), 2);
/// ```
#[derive(Debug)]
pub struct MockExecutor {
    /// Recorded requests.
    executions: Arc<RwLock<Vec<ExecutionRequest>>>,
    /// If set, the next execution will fail with this error.
    next_error: Arc<RwLock<Option<ExecutorError>>>,
    /// Events to emit instead of the default sequence.
    scripted_events: Option<Vec<ExecutionEvent>>,
    /// URLs reported on success.
    download_urls: Vec<String>,
    /// Simulated run time before success.
    delay: Duration,
    /// Run until terminated.
    hang: bool,
    /// Never observe the terminate signal.
    ignore_terminate: bool,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExecutor {
    /// Create a mock that succeeds immediately.
    pub fn new() -> Self {
        Self {
            executions: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            scripted_events: None,
            download_urls: vec!["https://cdn.example.com/mock/video.mp4".to_string()],
            delay: Duration::ZERO,
            hang: false,
            ignore_terminate: false,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Keep running until termination is requested.
    pub fn with_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Never react to termination (the scheduler has to abort the task).
    pub fn ignoring_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }

    /// Take `delay` before succeeding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// URLs to report when the execution succeeds.
    pub fn with_download_urls(mut self, urls: Vec<String>) -> Self {
        self.download_urls = urls;
        self
    }

    /// Emit exactly these events before finishing.
    pub fn with_events(mut self, events: Vec<ExecutionEvent>) -> Self {
        self.scripted_events = Some(events);
        self
    }

    /// Configure the next execution to fail with the given error.
    pub async fn set_next_error(&self, error: ExecutorError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get all recorded requests.
    pub async fn recorded_executions(&self) -> Vec<ExecutionRequest> {
        self.executions.read().await.clone()
    }

    /// Get the number of executions started.
    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    /// Executions currently running.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of executions that ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn events_for(&self, request: &ExecutionRequest) -> Vec<ExecutionEvent> {
        if let Some(events) = &self.scripted_events {
            return events.clone();
        }

        let mut events = vec![
            ExecutionEvent::Metadata {
                title: Some("Mock video".to_string()),
                description: None,
            },
            ExecutionEvent::Progress { percent: 10.0 },
        ];
        if self.hang {
            return events;
        }

        events.push(ExecutionEvent::Progress { percent: 100.0 });
        if request.kind.time_range().is_some() {
            events.push(ExecutionEvent::ConversionStarted);
            events.push(ExecutionEvent::ConversionFinished);
        }
        events.push(ExecutionEvent::UploadStarted);
        events.push(ExecutionEvent::Uploaded {
            urls: self.download_urls.clone(),
        });
        events
    }

    async fn wait(&self, terminate: &mut watch::Receiver<bool>) -> Result<(), ExecutorError> {
        if self.ignore_terminate {
            if self.hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(self.delay).await;
            return Ok(());
        }

        if self.hang {
            termination_requested(terminate).await;
            return Err(ExecutorError::Terminated);
        }

        tokio::select! {
            _ = termination_requested(terminate) => Err(ExecutorError::Terminated),
            _ = tokio::time::sleep(self.delay) => Ok(()),
        }
    }
}

#[async_trait]
impl JobExecutor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        events: mpsc::Sender<ExecutionEvent>,
        mut terminate: watch::Receiver<bool>,
    ) -> Result<ExecutionOutput, ExecutorError> {
        self.executions.write().await.push(request.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.active));

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        for event in self.events_for(&request) {
            let _ = events.send(event).await;
        }

        self.wait(&mut terminate).await?;

        Ok(ExecutionOutput {
            download_urls: self.download_urls.clone(),
        })
    }
}
