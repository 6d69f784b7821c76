//! Download queue handlers.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use nomusic_core::downloader::FormatKind;
use nomusic_core::{QueueAddRequest, QueueSnapshot};

use super::error::{from_queue_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub queue_id: String,
}

/// `POST /queue/add`: enqueue one download.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueueAddRequest>,
) -> Json<AddResponse> {
    let queue_id = state.queue().add(body).await;
    Json(AddResponse { queue_id })
}

#[derive(Debug, Deserialize)]
pub struct AddBatchVideo {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub format_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddBatchBody {
    pub videos: Vec<AddBatchVideo>,
    #[serde(default, alias = "format")]
    pub format_kind: FormatKind,
    #[serde(default)]
    pub subtitles: Option<String>,
    #[serde(default)]
    pub auto_separate: bool,
}

#[derive(Debug, Serialize)]
pub struct AddBatchResponse {
    pub added: usize,
}

/// `POST /queue/add-batch`: enqueue several downloads sharing options
/// (the playlist flow).
pub async fn add_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddBatchBody>,
) -> Json<AddBatchResponse> {
    let requests: Vec<QueueAddRequest> = body
        .videos
        .into_iter()
        .map(|video| QueueAddRequest {
            url: video.url,
            format_kind: body.format_kind,
            format_id: video.format_id,
            subtitles: body.subtitles.clone(),
            auto_separate: body.auto_separate,
            title: video.title,
        })
        .collect();

    let added = state.queue().add_batch(requests).await;
    Json(AddBatchResponse { added })
}

#[derive(Debug, Deserialize)]
pub struct RemoveBody {
    pub queue_id: String,
}

/// `POST /queue/remove`: drop a Pending item.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RemoveBody>,
) -> Result<Json<QueueSnapshot>, ApiError> {
    state
        .queue()
        .remove(&body.queue_id)
        .await
        .map_err(from_queue_error)?;
    Ok(Json(state.queue().snapshot().await))
}

/// `POST /queue/clear`: drop Completed and Failed items.
pub async fn clear(State(state): State<Arc<AppState>>) -> Json<QueueSnapshot> {
    state.queue().clear_done().await;
    Json(state.queue().snapshot().await)
}

/// `POST /queue/start`: start the dispatcher.
pub async fn start(State(state): State<Arc<AppState>>) -> Json<QueueSnapshot> {
    state.queue().start();
    Json(state.queue().snapshot().await)
}

/// `POST /queue/stop`: stop picking new items (in-flight finishes).
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<QueueSnapshot> {
    state.queue().stop();
    Json(state.queue().snapshot().await)
}

/// `GET /queue`: queue snapshot.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<QueueSnapshot> {
    Json(state.queue().snapshot().await)
}
