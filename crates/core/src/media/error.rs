//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    /// Input file missing, unreadable, or without audio.
    #[error("invalid input {path}: {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// ffprobe failed or produced unparseable output.
    #[error("probe failed for {path}: {stderr_tail}")]
    ProbeFailed { path: PathBuf, stderr_tail: String },

    /// ffmpeg decode/resample failure.
    #[error("audio extraction failed: {stderr_tail}")]
    ExtractFailed { stderr_tail: String },

    /// Loudness normalization failure.
    #[error("loudness normalization failed: {stderr_tail}")]
    NormalizeFailed { stderr_tail: String },

    /// Final remux failure.
    #[error("remux failed: {stderr_tail}")]
    RemuxFailed { stderr_tail: String },

    /// Segment split/concat failure.
    #[error("segment operation failed: {stderr_tail}")]
    SegmentFailed { stderr_tail: String },

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Map a subprocess error into a specific media failure kind.
    pub(crate) fn from_cmd(err: crate::cmd::CmdError, kind: FailureKind) -> Self {
        use crate::cmd::CmdError;
        match err {
            CmdError::Cancelled => MediaError::Cancelled,
            CmdError::NonZeroExit { stderr_tail, .. } => kind.wrap(stderr_tail),
            CmdError::Timeout { program, timeout_secs } => {
                kind.wrap(format!("{program} timed out after {timeout_secs}s"))
            }
            CmdError::Spawn { program, source } => {
                kind.wrap(format!("failed to spawn {program}: {source}"))
            }
            CmdError::Io(e) => MediaError::Io(e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum FailureKind {
    Extract,
    Normalize,
    Remux,
    Segment,
}

impl FailureKind {
    fn wrap(self, stderr_tail: String) -> MediaError {
        match self {
            FailureKind::Extract => MediaError::ExtractFailed { stderr_tail },
            FailureKind::Normalize => MediaError::NormalizeFailed { stderr_tail },
            FailureKind::Remux => MediaError::RemuxFailed { stderr_tail },
            FailureKind::Segment => MediaError::SegmentFailed { stderr_tail },
        }
    }
}
