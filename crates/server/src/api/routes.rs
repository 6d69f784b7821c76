use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{download, folder, handlers, library, queue, separate, status};
use crate::state::AppState;

/// 2 GiB upload ceiling; inputs are whole video files.
const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Separation
        .route("/separate", post(separate::separate_upload))
        .route("/separate-file", post(separate::separate_file))
        // Folder batches
        .route("/folder/scan", post(folder::scan))
        .route("/folder-queue/process", post(folder::process))
        .route("/folder-queue/remove", post(folder::remove))
        .route("/batch-status/{batch_id}", get(folder::batch_status))
        // Downloads
        .route("/download", post(download::start_download))
        .route("/download/cancel", post(download::cancel))
        .route("/yt-formats", post(download::yt_formats))
        // Download queue
        .route("/queue/add", post(queue::add))
        .route("/queue/add-batch", post(queue::add_batch))
        .route("/queue/remove", post(queue::remove))
        .route("/queue/clear", post(queue::clear))
        .route("/queue/start", post(queue::start))
        .route("/queue/stop", post(queue::stop))
        .route("/queue", get(queue::list))
        // Jobs and library
        .route("/status/{job_id}", get(status::job_status))
        .route("/library", get(library::list))
        .route("/library/delete", post(library::delete))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        // The UI is served from another local port.
        .layer(CorsLayer::permissive())
        .with_state(state)
}
