//! Binary updater API handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use reelhaul_core::{UpdateCheck, UpdateStatus};

use crate::state::AppState;

/// Error response for updater operations
#[derive(Debug, Serialize)]
pub struct UpdaterErrorResponse {
    pub error: String,
}

fn disabled() -> (StatusCode, Json<UpdaterErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(UpdaterErrorResponse {
            error: "Binary updater is disabled".to_string(),
        }),
    )
}

/// Current updater state
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UpdateStatus>, (StatusCode, Json<UpdaterErrorResponse>)> {
    match state.updater() {
        Some(updater) => Ok(Json(updater.status().await)),
        None => Err(disabled()),
    }
}

/// Compare the installed binary with the latest release
pub async fn check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UpdateCheck>, (StatusCode, Json<UpdaterErrorResponse>)> {
    let updater = state.updater().ok_or_else(disabled)?;

    updater.check_for_updates().await.map(Json).map_err(|e| {
        (
            StatusCode::BAD_GATEWAY,
            Json(UpdaterErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}
