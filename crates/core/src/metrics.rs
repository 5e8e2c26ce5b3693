//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job lifecycle (created, finished, durations)
//! - Scheduler load (queue depth, in-progress slots)
//! - Binary updates

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs registered total.
pub static JOBS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelhaul_jobs_created_total", "Total jobs registered").unwrap()
});

/// Jobs reaching a terminal status, by status.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelhaul_jobs_finished_total", "Total jobs finished"),
        &["status"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Execution duration in seconds, from dispatch to finish.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelhaul_job_duration_seconds",
            "Duration of job executions",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Jobs waiting in the queue.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("reelhaul_queue_depth", "Number of jobs waiting to run").unwrap()
});

/// Jobs currently holding an execution slot.
pub static JOBS_IN_PROGRESS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelhaul_jobs_in_progress",
        "Number of jobs currently executing",
    )
    .unwrap()
});

/// Executions force-aborted after ignoring a termination request.
pub static FORCED_TERMINATIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelhaul_forced_terminations_total",
        "Executions aborted after the cancel timeout elapsed",
    )
    .unwrap()
});

// =============================================================================
// Binary Update Metrics
// =============================================================================

/// Update attempts by result.
pub static BINARY_UPDATE_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelhaul_binary_update_attempts_total",
            "Total binary update attempts",
        ),
        &["result"], // "updated", "up_to_date", "deferred", "rolled_back", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_CREATED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        // Scheduler
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(JOBS_IN_PROGRESS.clone()),
        Box::new(FORCED_TERMINATIONS.clone()),
        // Updates
        Box::new(BINARY_UPDATE_ATTEMPTS.clone()),
    ]
}
