//! Separation submission handlers.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use nomusic_core::downloader::sanitize_filename;
use nomusic_core::{JobSnapshot, MediaProbe, ModelSelection, SeparationOptions};

use super::error::{error, from_pipeline_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub metadata: Option<MediaProbe>,
}

fn submit_response(snapshot: Option<JobSnapshot>, job_id: String) -> Json<SubmitResponse> {
    Json(SubmitResponse {
        job_id,
        metadata: snapshot.and_then(|s| s.metadata),
    })
}

/// `POST /separate`: multipart upload with a `file` part and an optional
/// `model` field. The upload is staged to disk, then queued.
pub async fn separate_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut staged: Option<PathBuf> = None;
    let mut model = ModelSelection::Both;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("invalid multipart: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let original_name = field
                    .file_name()
                    .map(|n| sanitize_filename(n, 200))
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| error(StatusCode::BAD_REQUEST, "file part needs a filename"))?;

                let upload_dir = &state.config().storage.upload_dir;
                tokio::fs::create_dir_all(upload_dir)
                    .await
                    .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

                let path = upload_dir.join(format!("{}_{}", uuid::Uuid::new_v4(), original_name));
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| error(StatusCode::BAD_REQUEST, format!("upload failed: {e}")))?;
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
                staged = Some(path);
            }
            Some("model") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| error(StatusCode::BAD_REQUEST, e.to_string()))?;
                model = value
                    .parse()
                    .map_err(|e: String| error(StatusCode::BAD_REQUEST, e))?;
            }
            _ => {}
        }
    }

    let input = staged.ok_or_else(|| error(StatusCode::BAD_REQUEST, "missing file part"))?;

    let job_id = state
        .pipeline()
        .submit_separation(
            input,
            SeparationOptions {
                model,
                ..Default::default()
            },
        )
        .await
        .map_err(from_pipeline_error)?;

    let snapshot = state.pipeline().status(&job_id).await;
    Ok(submit_response(snapshot, job_id))
}

#[derive(Debug, Deserialize)]
pub struct SeparateFileBody {
    pub file_path: String,
    #[serde(default)]
    pub model: ModelSelection,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub keep_temp: bool,
}

/// `POST /separate-file`: separate a file already on disk.
pub async fn separate_file(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SeparateFileBody>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let job_id = state
        .pipeline()
        .submit_separation(
            PathBuf::from(&body.file_path),
            SeparationOptions {
                model: body.model,
                duration_limit: body.duration,
                keep_temp: body.keep_temp,
                language_preference: None,
            },
        )
        .await
        .map_err(from_pipeline_error)?;

    let snapshot = state.pipeline().status(&job_id).await;
    Ok(submit_response(snapshot, job_id))
}
