//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the reelhaul server:
//! - HTTP request metrics (latency, counts)
//! - Scheduler and updater status (collected dynamically)
//! - Job and update metrics registered by the core crate

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelhaul_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelhaul_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelhaul_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics (collected dynamically)
// =============================================================================

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelhaul_scheduler_running",
        "Whether the scheduler is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Dispatch paused for a binary update (1 = paused).
pub static SCHEDULER_PAUSED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelhaul_scheduler_paused",
        "Whether dispatch is paused for binary maintenance",
    )
    .unwrap()
});

// =============================================================================
// Updater Metrics (collected dynamically)
// =============================================================================

/// Update attempt in progress (1 = updating).
pub static UPDATER_UPDATING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelhaul_updater_updating",
        "Whether a binary update is being installed",
    )
    .unwrap()
});

/// Consecutive failed update attempts.
pub static UPDATER_RETRY_COUNT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelhaul_updater_retry_count",
        "Consecutive failed binary update attempts",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Scheduler
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_PAUSED.clone()))
        .unwrap();

    // Updater
    registry
        .register(Box::new(UPDATER_UPDATING.clone()))
        .unwrap();
    registry
        .register(Box::new(UPDATER_RETRY_COUNT.clone()))
        .unwrap();

    // Core metrics (jobs, queue, updates)
    for metric in reelhaul_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the status gauges reflect the scheduler and
/// updater at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.scheduler().status().await;
    SCHEDULER_RUNNING.set(i64::from(status.running));
    SCHEDULER_PAUSED.set(i64::from(status.paused));

    if let Some(updater) = state.updater() {
        let status = updater.status().await;
        UPDATER_UPDATING.set(i64::from(status.is_updating));
        UPDATER_RETRY_COUNT.set(i64::from(status.retry_count));
    }
}

static UUID_REGEX: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

static NUMERIC_REGEX: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_REGEX.replace_all(path, "{id}");
    let result = NUMERIC_REGEX.replace_all(&result, "/{id}$1");
    result.to_string()
}
