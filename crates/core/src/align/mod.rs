//! Cross-correlation alignment and mixing of the two vocal stems.
//!
//! The two separators are fed the same audio but their outputs can drift by
//! a handful of milliseconds. Before mixing, the lag between them is
//! estimated on smoothed envelopes and the earlier stream is left-padded
//! with silence; nothing is ever truncated.

mod aligner;
mod mixer;
mod wav;
mod xcorr;

pub use aligner::{align_files, AlignConfig, AlignmentResult};
pub use mixer::mix_files;
pub use wav::{read_wav, write_wav, AudioBuffer};
pub use xcorr::{estimate_lag, LagEstimate};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("mix failed: {reason}")]
    MixFailed { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
