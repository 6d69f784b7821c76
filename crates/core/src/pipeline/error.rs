//! Pipeline error type and its mapping onto the stable error kinds.

use std::path::PathBuf;
use thiserror::Error;

use crate::align::AlignError;
use crate::downloader::DownloadError;
use crate::media::MediaError;
use crate::separator::SeparatorError;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("invalid input {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    #[error(transparent)]
    Media(MediaError),

    #[error("separator {which} failed: {message}")]
    SeparatorFailed { which: String, message: String },

    #[error("both separators failed; spleeter: {spleeter}; demucs: {demucs}")]
    BothSeparatorsFailed { spleeter: String, demucs: String },

    #[error("mix failed: {0}")]
    Mix(AlignError),

    #[error(transparent)]
    Download(DownloadError),

    #[error("cancelled")]
    Cancelled,

    #[error("pipeline is shutting down")]
    ShuttingDown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable kind, surfaced through job snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Tool(_) => "missing_dependency",
            PipelineError::InvalidInput { .. } => "invalid_input",
            PipelineError::Media(MediaError::ProbeFailed { .. }) => "probe_failed",
            PipelineError::Media(MediaError::ExtractFailed { .. }) => "extract_failed",
            PipelineError::Media(MediaError::NormalizeFailed { .. }) => "normalize_failed",
            PipelineError::Media(MediaError::RemuxFailed { .. }) => "remux_failed",
            PipelineError::Media(MediaError::InvalidInput { .. }) => "invalid_input",
            PipelineError::Media(_) => "media_failed",
            PipelineError::SeparatorFailed { .. } => "separator_failed",
            PipelineError::BothSeparatorsFailed { .. } => "separator_failed",
            PipelineError::Mix(_) => "mix_failed",
            PipelineError::Download(DownloadError::Permanent { .. }) => "download_permanent",
            PipelineError::Download(_) => "download_transient",
            PipelineError::Cancelled => "cancelled",
            PipelineError::ShuttingDown => "internal",
            PipelineError::Io(_) => "internal",
        }
    }
}

impl From<MediaError> for PipelineError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Media(other),
        }
    }
}

impl From<SeparatorError> for PipelineError {
    fn from(err: SeparatorError) -> Self {
        match err {
            SeparatorError::Cancelled => PipelineError::Cancelled,
            SeparatorError::Failed { which, stderr_tail } => PipelineError::SeparatorFailed {
                which,
                message: stderr_tail,
            },
            SeparatorError::NoOutput { which, path } => PipelineError::SeparatorFailed {
                which,
                message: format!("no vocals produced at {}", path.display()),
            },
            SeparatorError::Media(e) => PipelineError::Media(e),
            SeparatorError::Io(e) => PipelineError::Io(e),
        }
    }
}

impl From<DownloadError> for PipelineError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Download(other),
        }
    }
}
