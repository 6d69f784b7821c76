//! Shared error response shape.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use nomusic_core::pipeline::PipelineError;
use nomusic_core::queue::QueueError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn from_queue_error(e: QueueError) -> ApiError {
    match &e {
        QueueError::NotFound(_) => error(StatusCode::NOT_FOUND, e.to_string()),
        QueueError::InvalidState { .. } => error(StatusCode::CONFLICT, e.to_string()),
        QueueError::Pipeline(p) => from_pipeline_error_ref(p),
        QueueError::Io(_) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn from_pipeline_error(e: PipelineError) -> ApiError {
    from_pipeline_error_ref(&e)
}

fn from_pipeline_error_ref(e: &PipelineError) -> ApiError {
    match e {
        PipelineError::InvalidInput { .. } => error(StatusCode::BAD_REQUEST, e.to_string()),
        _ => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
