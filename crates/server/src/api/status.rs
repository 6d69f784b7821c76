//! Job snapshot handler.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use nomusic_core::JobSnapshot;

use super::error::{error, ApiError};
use crate::state::AppState;

/// `GET /status/{job_id}`: immutable job snapshot.
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    match state.pipeline().status(&job_id).await {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(error(
            StatusCode::NOT_FOUND,
            format!("Task not found: {job_id}"),
        )),
    }
}
