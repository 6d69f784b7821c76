//! Folder batch handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use nomusic_core::queue::BatchItem;
use nomusic_core::{BatchStatus, ModelSelection};

use super::error::{from_queue_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanBody {
    pub folder_path: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub queue_id: String,
    pub files: Vec<BatchItem>,
}

/// `POST /folder/scan`: list processable files in a folder.
pub async fn scan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScanBody>,
) -> Result<Json<ScanResponse>, ApiError> {
    let (batch_id, files) = state
        .batches()
        .scan(&PathBuf::from(&body.folder_path))
        .await
        .map_err(from_queue_error)?;
    Ok(Json(ScanResponse {
        queue_id: batch_id,
        files,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessBody {
    pub queue_id: String,
    #[serde(default)]
    pub model: ModelSelection,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub batch_id: String,
    pub files: Vec<BatchItem>,
}

/// `POST /folder-queue/process`: start the batch.
pub async fn process(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProcessBody>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let files = state
        .batches()
        .process(&body.queue_id, body.model)
        .await
        .map_err(from_queue_error)?;
    Ok(Json(ProcessResponse {
        batch_id: body.queue_id,
        files,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RemoveBody {
    pub queue_id: String,
    pub file_id: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub files: Vec<BatchItem>,
}

/// `POST /folder-queue/remove`: drop an unprocessed item.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RemoveBody>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let files = state
        .batches()
        .remove(&body.queue_id, &body.file_id)
        .await
        .map_err(from_queue_error)?;
    Ok(Json(RemoveResponse { files }))
}

/// `GET /batch-status/{batch_id}`: batch snapshot.
pub async fn batch_status(
    State(state): State<Arc<AppState>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchStatus>, ApiError> {
    let status = state
        .batches()
        .status(&batch_id)
        .await
        .map_err(from_queue_error)?;
    Ok(Json(status))
}
