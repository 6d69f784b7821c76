//! The separator contract.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::cmd::CancelFlag;

use super::error::SeparatorError;

/// One progress event from a driver: local percentage plus a step label.
#[derive(Debug, Clone)]
pub struct StepProgress {
    /// 0–100, local to this driver invocation.
    pub pct: f32,
    pub step: String,
}

impl StepProgress {
    pub fn new(pct: f32, step: impl Into<String>) -> Self {
        Self {
            pct,
            step: step.into(),
        }
    }
}

/// A vocal-stem separator.
///
/// Implementations must write only inside `out_dir` (supplied empty by the
/// caller), emit at least one progress event per segment, and honor the
/// cancel flag at every subprocess boundary.
#[async_trait]
pub trait Separator: Send + Sync {
    /// Driver name used in step labels and error reporting.
    fn name(&self) -> &'static str;

    /// Isolate the vocal stem of `wav_in`, returning the final vocal WAV.
    async fn separate(
        &self,
        wav_in: &Path,
        out_dir: &Path,
        progress: mpsc::Sender<StepProgress>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, SeparatorError>;
}
