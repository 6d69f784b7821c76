//! Library handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use nomusic_core::LibraryRecord;

use super::error::{error, ApiError};
use crate::state::AppState;

/// `GET /library`: completed items, newest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<LibraryRecord>> {
    Json(state.library().list().await)
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
}

/// `POST /library/delete`: remove a record and its file from disk.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeleteBody>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let removed = state
        .library()
        .remove(&body.task_id)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if removed {
        Ok(Json(DeleteResponse { status: "ok" }))
    } else {
        Err(error(
            StatusCode::NOT_FOUND,
            format!("Task not found: {}", body.task_id),
        ))
    }
}
