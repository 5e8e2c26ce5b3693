//! Shared source of truth for jobs, the pending queue and in-progress work.
//!
//! Every mutation goes through one mutex: lock, mutate, release. Nothing in
//! here awaits I/O while the lock is held; terminating a running job only
//! flips a watch channel that the scheduler's supervisor task observes.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::executor::{ExecutionEvent, ExecutionOutput, ExecutionRequest};
use crate::metrics;

use super::error::JobError;
use super::queue::JobQueue;
use super::types::{Job, JobId, JobSnapshot, JobStatus};

/// Handle to a running execution. Only the registry can signal it.
#[derive(Debug)]
struct ExecutionHandle {
    terminate: watch::Sender<bool>,
    started_at: DateTime<Utc>,
}

/// A job handed to the scheduler by [`JobRegistry::start_next`].
#[derive(Debug)]
pub struct Dispatch {
    pub job: JobSnapshot,
    pub request: ExecutionRequest,
    /// Flips to `true` when cancellation is requested.
    pub terminate: watch::Receiver<bool>,
}

/// How an execution ended, as observed by the scheduler.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Succeeded(ExecutionOutput),
    Failed(String),
    /// The execution confirmed termination or was force-aborted.
    Terminated,
}

/// Aggregate counters for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCounts {
    pub total: usize,
    pub queued: usize,
    pub in_progress: usize,
    pub finished: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    jobs: HashMap<JobId, Job>,
    queue: JobQueue,
    in_progress: HashMap<JobId, ExecutionHandle>,
    /// Terminal jobs, oldest first, for eviction.
    finished: VecDeque<JobId>,
    /// While set, nothing new is dispatched (binary swap in progress).
    maintenance: bool,
}

impl RegistryState {
    fn publish_gauges(&self) {
        metrics::QUEUE_DEPTH.set(self.queue.len() as i64);
        metrics::JOBS_IN_PROGRESS.set(self.in_progress.len() as i64);
    }

    fn record_finished(&mut self, id: &str, max_finished: usize) {
        if let Some(job) = self.jobs.get(id) {
            metrics::JOBS_FINISHED
                .with_label_values(&[job.status.state_type()])
                .inc();
        }
        self.finished.push_back(id.to_string());
        if max_finished == 0 {
            return;
        }
        while self.finished.len() > max_finished {
            if let Some(evicted) = self.finished.pop_front() {
                self.jobs.remove(&evicted);
                debug!("Evicted finished job {}", evicted);
            }
        }
    }
}

/// Authoritative registry of all jobs.
#[derive(Debug)]
pub struct JobRegistry {
    state: Mutex<RegistryState>,
    notify: Notify,
    max_finished_jobs: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

impl JobRegistry {
    /// Creates an empty registry keeping at most `max_finished_jobs` terminal
    /// jobs (`0` keeps them all).
    pub fn new(max_finished_jobs: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            notify: Notify::new(),
            max_finished_jobs,
        }
    }

    /// Inserts a pending job and enqueues it.
    pub async fn register(&self, job: Job) -> Result<JobSnapshot, JobError> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(JobError::invalid_state(
                &job.id,
                job.status.state_type(),
                "register",
            ));
        }
        if job.status != JobStatus::Pending {
            return Err(JobError::invalid_state(
                &job.id,
                job.status.state_type(),
                "register",
            ));
        }

        let snapshot = job.snapshot();
        state.queue.push(job.id.clone());
        state.jobs.insert(job.id.clone(), job);
        state.publish_gauges();
        drop(state);

        metrics::JOBS_CREATED.inc();
        debug!("Registered job {}", snapshot.id);
        self.notify.notify_one();
        Ok(snapshot)
    }

    pub async fn get(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(id)
            .map(Job::snapshot)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// All known jobs, oldest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        let mut jobs: Vec<&Job> = state.jobs.values().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs.into_iter().map(Job::snapshot).collect()
    }

    /// Cancels a job.
    ///
    /// A queued job is removed from the queue and marked cancelled without
    /// ever reaching the executor. A running job moves to `Cancelling` and its
    /// execution is asked to terminate; the scheduler finalises it.
    pub async fn cancel(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        match job.status.clone() {
            JobStatus::Pending => {
                state.queue.delete(id);
                job.transition(JobStatus::Cancelled);
                let snapshot = job.snapshot();
                state.record_finished(id, self.max_finished_jobs);
                state.publish_gauges();
                info!("Cancelled queued job {}", id);
                Ok(snapshot)
            }
            JobStatus::Cancelling => {
                if let Some(handle) = state.in_progress.get(id) {
                    handle.terminate.send_replace(true);
                }
                Ok(job.snapshot())
            }
            status if status.is_active() => {
                let from = status.state_type();
                job.transition(JobStatus::Cancelling);
                match state.in_progress.get(id) {
                    Some(handle) => {
                        handle.terminate.send_replace(true);
                    }
                    None => warn!("Job {} is {} but has no execution handle", id, from),
                }
                info!("Cancellation requested for job {} (was {})", id, from);
                Ok(job.snapshot())
            }
            status => Err(JobError::invalid_state(id, status.state_type(), "cancel")),
        }
    }

    /// Ids of jobs currently holding a slot.
    pub async fn in_progress_ids(&self) -> Vec<JobId> {
        let state = self.state.lock().await;
        state.in_progress.keys().cloned().collect()
    }

    /// Queued ids from head to tail.
    pub async fn queue_snapshot(&self) -> Vec<JobId> {
        self.state.lock().await.queue.snapshot()
    }

    pub async fn counts(&self) -> RegistryCounts {
        let state = self.state.lock().await;
        RegistryCounts {
            total: state.jobs.len(),
            queued: state.queue.len(),
            in_progress: state.in_progress.len(),
            finished: state.jobs.values().filter(|j| j.status.is_terminal()).count(),
        }
    }

    /// Blocks dispatch if, and only if, nothing is running.
    ///
    /// Returns false when jobs are in progress.
    pub async fn try_begin_maintenance(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.in_progress.is_empty() {
            return false;
        }
        state.maintenance = true;
        true
    }

    /// Re-enables dispatch after [`try_begin_maintenance`](Self::try_begin_maintenance).
    pub async fn end_maintenance(&self) {
        self.state.lock().await.maintenance = false;
        self.notify.notify_one();
    }

    pub async fn in_maintenance(&self) -> bool {
        self.state.lock().await.maintenance
    }

    /// Waits until something may have become dispatchable.
    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Pops the next queued job if a slot is free and marks it `Downloading`.
    pub(crate) async fn start_next(&self, limit: usize) -> Option<Dispatch> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.maintenance || state.in_progress.len() >= limit {
            return None;
        }

        while let Some(id) = state.queue.pop() {
            let Some(job) = state.jobs.get_mut(&id) else {
                warn!("Queued job {} missing from registry", id);
                continue;
            };
            if !job.transition(JobStatus::Downloading) {
                warn!("Queued job {} is {}, skipping", id, job.status);
                continue;
            }

            let (terminate, terminate_rx) = watch::channel(false);
            let dispatch = Dispatch {
                job: job.snapshot(),
                request: ExecutionRequest {
                    job_id: id.clone(),
                    kind: job.kind.clone(),
                },
                terminate: terminate_rx,
            };
            state.in_progress.insert(
                id,
                ExecutionHandle {
                    terminate,
                    started_at: Utc::now(),
                },
            );
            state.publish_gauges();
            return Some(dispatch);
        }
        None
    }

    /// Applies a stage event reported by the executor.
    ///
    /// Events for jobs that are cancelling or already finished are dropped.
    pub(crate) async fn apply_event(&self, id: &str, event: ExecutionEvent) {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(id) else {
            return;
        };
        if job.status == JobStatus::Cancelling || job.status.is_terminal() {
            debug!("Ignoring {:?} for job {} in {}", event, id, job.status);
            return;
        }

        let next = match event {
            ExecutionEvent::Metadata { title, description } => {
                job.title = title;
                job.description = description;
                None
            }
            ExecutionEvent::Progress { percent } => {
                job.progress_pct = Some(percent.clamp(0.0, 100.0));
                None
            }
            ExecutionEvent::ConversionStarted => Some(JobStatus::Converting),
            ExecutionEvent::ConversionFinished => None,
            ExecutionEvent::UploadStarted => Some(JobStatus::Uploading),
            ExecutionEvent::Uploaded { urls } => {
                job.download_urls = urls;
                None
            }
        };

        match next {
            Some(next) => {
                let from = job.status.state_type();
                if job.kind.next_stage(&job.status).as_ref() != Some(&next) {
                    warn!(
                        "Job {}: ignoring out-of-order stage {} after {}",
                        id, next, from
                    );
                } else if job.transition(next) {
                    debug!("Job {} {} -> {}", id, from, job.status);
                } else {
                    warn!("Job {}: ignoring illegal stage change from {}", id, from);
                }
            }
            None => job.updated_at = Utc::now(),
        }
    }

    /// Finalises an execution and frees its slot.
    ///
    /// A job that was cancelling always ends `Cancelled`, whatever the outcome.
    pub(crate) async fn finish(&self, id: &str, outcome: ExecutionOutcome) -> Option<JobStatus> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let handle = state.in_progress.remove(id);
        let Some(job) = state.jobs.get_mut(id) else {
            state.publish_gauges();
            drop(guard);
            self.notify.notify_one();
            return None;
        };

        if job.status == JobStatus::Cancelling {
            job.transition(JobStatus::Cancelled);
        } else {
            match outcome {
                ExecutionOutcome::Succeeded(output) => {
                    if !output.download_urls.is_empty() {
                        job.download_urls = output.download_urls;
                    }
                    // Uploading may go unreported; any earlier stage may not.
                    let missing = match job.kind.next_stage(&job.status) {
                        Some(JobStatus::Uploading) => {
                            job.transition(JobStatus::Uploading);
                            None
                        }
                        next => next,
                    };
                    match missing {
                        Some(stage) => {
                            warn!("Job {} succeeded without reaching {}", id, stage);
                            job.transition(JobStatus::Failed {
                                error: format!("{} stage not reported", stage),
                            });
                        }
                        None => {
                            job.transition(JobStatus::Completed);
                        }
                    }
                }
                ExecutionOutcome::Failed(error) => {
                    job.transition(JobStatus::Failed { error });
                }
                ExecutionOutcome::Terminated => {
                    job.transition(JobStatus::Failed {
                        error: "execution terminated unexpectedly".to_string(),
                    });
                }
            }
        }

        let status = job.status.clone();
        if let Some(handle) = handle {
            let elapsed = (Utc::now() - handle.started_at).num_milliseconds() as f64 / 1000.0;
            metrics::JOB_DURATION
                .with_label_values(&[status.state_type()])
                .observe(elapsed.max(0.0));
        }
        if status.is_terminal() {
            state.record_finished(id, self.max_finished_jobs);
        } else {
            warn!("Job {} finished in non-terminal status {}", id, status);
        }
        state.publish_gauges();
        drop(guard);

        info!("Job {} finished: {}", id, status);
        self.notify.notify_one();
        Some(status)
    }
}
