//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use reelhaul_core::{CreateJobRequest, JobError, JobId, JobSnapshot};

use crate::state::AppState;

/// Maximum allowed limit for job listings
const MAX_LIMIT: usize = 1000;

/// Default limit for job listings
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status (`pending`, `downloading`, `completed`, ...)
    pub status: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<usize>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSnapshot>,
    pub total: usize,
    /// Pending job ids in dispatch order
    pub queue: Vec<JobId>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<JobErrorResponse>);

fn error_response(err: JobError) -> ApiError {
    let status = match &err {
        JobError::Validation(_) => StatusCode::BAD_REQUEST,
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::InvalidState { .. } => StatusCode::CONFLICT,
    };
    (
        status,
        Json(JobErrorResponse {
            error: err.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new video download job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobSnapshot>), ApiError> {
    let job = state
        .jobs()
        .create_video_download_job(body)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    state.jobs().get_job(&id).await.map(Json).map_err(error_response)
}

/// List jobs in creation order
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Json<ListJobsResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let mut jobs = state.jobs().list_jobs().await;
    if let Some(ref status) = params.status {
        jobs.retain(|job| &job.status == status);
    }
    let total = jobs.len();
    jobs.truncate(limit);

    Json(ListJobsResponse {
        jobs,
        total,
        queue: state.jobs().queue_snapshot().await,
    })
}

/// Cancel a job (DELETE endpoint)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    state
        .jobs()
        .cancel_job(&id)
        .await
        .map(Json)
        .map_err(error_response)
}
