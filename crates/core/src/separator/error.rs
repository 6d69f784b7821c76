//! Separator error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::media::MediaError;

#[derive(Debug, Error)]
pub enum SeparatorError {
    /// The external model exited non-zero.
    #[error("{which} failed: {stderr_tail}")]
    Failed { which: String, stderr_tail: String },

    /// The model exited cleanly but left no usable vocal file.
    #[error("{which} produced no vocals at {path}")]
    NoOutput { which: String, path: PathBuf },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Media(MediaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for SeparatorError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Cancelled => SeparatorError::Cancelled,
            other => SeparatorError::Media(other),
        }
    }
}

impl SeparatorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SeparatorError::Cancelled)
    }
}
