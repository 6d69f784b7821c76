//! Download and remote-probe handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use nomusic_core::{CancelOutcome, DownloadRequest, FormatKind, FormatProbe};

use super::error::{error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadBody {
    pub url: String,
    #[serde(default, alias = "format")]
    pub format_kind: FormatKind,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub subtitles: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub job_id: String,
}

/// `POST /download`: start a download job immediately (no queue).
pub async fn start_download(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DownloadBody>,
) -> Result<Json<DownloadResponse>, ApiError> {
    if body.url.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "URL is required"));
    }

    let job_id = state
        .pipeline()
        .submit_download(DownloadRequest {
            url: body.url,
            format_kind: body.format_kind,
            format_id: body.format_id,
            subtitles: body.subtitles,
            filename: body.filename,
        })
        .await;

    Ok(Json(DownloadResponse { job_id }))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
}

/// `POST /download/cancel`: cancel an active job (download or separation).
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CancelBody>,
) -> Result<Json<CancelResponse>, ApiError> {
    match state.pipeline().cancel(&body.job_id).await {
        CancelOutcome::Accepted => Ok(Json(CancelResponse {
            status: "cancelling",
        })),
        CancelOutcome::AlreadyTerminal => Err(error(
            StatusCode::CONFLICT,
            "job already reached a terminal state",
        )),
        CancelOutcome::NotFound => Err(error(StatusCode::NOT_FOUND, "job not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct YtFormatsBody {
    pub url: String,
    #[serde(default)]
    pub check_playlist: bool,
}

/// `POST /yt-formats`: probe a remote URL for formats (or a playlist).
pub async fn yt_formats(
    State(state): State<Arc<AppState>>,
    Json(body): Json<YtFormatsBody>,
) -> Result<Json<FormatProbe>, ApiError> {
    if body.url.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "URL is required"));
    }

    let probe = state
        .downloader()
        .probe(&body.url, body.check_playlist)
        .await
        .map_err(|e| error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    Ok(Json(probe))
}
