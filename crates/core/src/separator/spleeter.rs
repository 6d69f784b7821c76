//! Spleeter driver (2-stems model).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cmd::{self, CancelFlag};
use crate::media::MediaToolkit;

use super::config::SeparatorConfig;
use super::error::SeparatorError;
use super::segment::{plan_segments, run_segmented, SegmentFailurePolicy};
use super::traits::{Separator, StepProgress};

const WHICH: &str = "spleeter";

/// Runs `python -m spleeter separate` as a child process.
///
/// Output layout: `<out_dir>/<input_stem>/vocals.wav`.
pub struct SpleeterDriver {
    tools: Arc<dyn MediaToolkit>,
    config: SeparatorConfig,
}

impl SpleeterDriver {
    pub fn new(tools: Arc<dyn MediaToolkit>, config: SeparatorConfig) -> Self {
        Self { tools, config }
    }

    async fn run_model(
        &self,
        input: &Path,
        out_dir: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), SeparatorError> {
        let args = vec![
            "-m".to_string(),
            "spleeter".to_string(),
            "separate".to_string(),
            "-p".to_string(),
            self.config.spleeter_model.clone(),
            "-o".to_string(),
            out_dir.to_string_lossy().to_string(),
            input.to_string_lossy().to_string(),
        ];

        cmd::run(&self.config.python, &args, cancel, None)
            .await
            .map(|_| ())
            .map_err(map_cmd_error)
    }

    fn vocal_path(&self, out_dir: &Path, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        out_dir.join(stem).join("vocals.wav")
    }
}

fn map_cmd_error(err: cmd::CmdError) -> SeparatorError {
    match err {
        cmd::CmdError::Cancelled => SeparatorError::Cancelled,
        cmd::CmdError::Io(e) => SeparatorError::Io(e),
        cmd::CmdError::NonZeroExit { stderr_tail, .. } => SeparatorError::Failed {
            which: WHICH.to_string(),
            stderr_tail,
        },
        other => SeparatorError::Failed {
            which: WHICH.to_string(),
            stderr_tail: other.to_string(),
        },
    }
}

async fn require_vocal(path: PathBuf) -> Result<PathBuf, SeparatorError> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.len() > 0 => Ok(path),
        _ => Err(SeparatorError::NoOutput {
            which: WHICH.to_string(),
            path,
        }),
    }
}

#[async_trait]
impl Separator for SpleeterDriver {
    fn name(&self) -> &'static str {
        WHICH
    }

    async fn separate(
        &self,
        wav_in: &Path,
        out_dir: &Path,
        progress: mpsc::Sender<StepProgress>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, SeparatorError> {
        let duration = self.tools.duration(wav_in).await?;
        let plan = plan_segments(duration, self.config.segment_len_secs);

        if plan.len() == 1 {
            let _ = progress
                .send(StepProgress::new(5.0, "spleeter: separating"))
                .await;
            self.run_model(wav_in, out_dir, cancel).await?;
            let vocal = require_vocal(self.vocal_path(out_dir, wav_in)).await?;
            let _ = progress
                .send(StepProgress::new(100.0, "spleeter: complete"))
                .await;
            return Ok(vocal);
        }

        run_segmented(
            WHICH,
            self.tools.as_ref(),
            wav_in,
            out_dir,
            duration,
            self.config.segment_len_secs,
            self.config.demucs_workers,
            // A failed Spleeter segment fails the whole driver; the
            // orchestrator then continues with the surviving model.
            SegmentFailurePolicy::Fail,
            &progress,
            cancel,
            |_, slice_path| async move {
                self.run_model(&slice_path, out_dir, cancel).await?;
                require_vocal(self.vocal_path(out_dir, &slice_path)).await
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocal_path_layout() {
        let driver = SpleeterDriver::new(
            Arc::new(crate::media::MediaTools::new(
                "ffmpeg".into(),
                "ffprobe".into(),
            )),
            SeparatorConfig::default(),
        );
        let vocal = driver.vocal_path(Path::new("/work/spleeter"), Path::new("/tmp/part_001.wav"));
        assert_eq!(vocal, PathBuf::from("/work/spleeter/part_001/vocals.wav"));
    }
}
