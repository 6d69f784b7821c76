//! Demucs driver (htdemucs model).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::cmd::{self, CancelFlag};
use crate::media::MediaToolkit;
use crate::tools::cuda_available;

use super::config::SeparatorConfig;
use super::error::SeparatorError;
use super::segment::{plan_segments, run_segmented, SegmentFailurePolicy};
use super::traits::{Separator, StepProgress};

const WHICH: &str = "demucs";

/// Runs `python -m demucs.separate` as a child process.
///
/// Output layout: `<out_dir>/<model>/<input_stem>/vocals.wav`.
pub struct DemucsDriver {
    tools: Arc<dyn MediaToolkit>,
    config: SeparatorConfig,
}

impl DemucsDriver {
    pub fn new(tools: Arc<dyn MediaToolkit>, config: SeparatorConfig) -> Self {
        Self { tools, config }
    }

    async fn run_model(
        &self,
        input: &Path,
        out_dir: &Path,
        device: &str,
        cancel: &CancelFlag,
    ) -> Result<(), SeparatorError> {
        let args = vec![
            "-m".to_string(),
            "demucs.separate".to_string(),
            "-n".to_string(),
            self.config.demucs_model.clone(),
            "-d".to_string(),
            device.to_string(),
            "-o".to_string(),
            out_dir.to_string_lossy().to_string(),
            input.to_string_lossy().to_string(),
        ];

        cmd::run(&self.config.python, &args, cancel, None)
            .await
            .map(|_| ())
            .map_err(|err| match err {
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
            })
    }

    /// Run the model on one input, falling back from GPU to CPU once.
    async fn run_with_fallback(
        &self,
        input: &Path,
        out_dir: &Path,
        gpu_requested: bool,
        cpu_fallback: &AtomicBool,
        progress: &mpsc::Sender<StepProgress>,
        cancel: &CancelFlag,
    ) -> Result<(), SeparatorError> {
        let use_gpu = gpu_requested && !cpu_fallback.load(Ordering::SeqCst);
        let device = if use_gpu { "cuda" } else { "cpu" };

        match self.run_model(input, out_dir, device, cancel).await {
            Ok(()) => Ok(()),
            Err(SeparatorError::Cancelled) => Err(SeparatorError::Cancelled),
            Err(e) if use_gpu => {
                warn!("demucs GPU run failed ({e}), retrying on CPU");
                cpu_fallback.store(true, Ordering::SeqCst);
                let _ = progress
                    .send(StepProgress::new(
                        0.0,
                        "demucs: GPU failed, falling back to CPU",
                    ))
                    .await;
                self.run_model(input, out_dir, "cpu", cancel).await
            }
            Err(e) => Err(e),
        }
    }

    fn vocal_path(&self, out_dir: &Path, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        out_dir
            .join(&self.config.demucs_model)
            .join(stem)
            .join("vocals.wav")
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
impl Separator for DemucsDriver {
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

        let gpu_requested = cuda_available().await;
        let cpu_fallback = AtomicBool::new(false);

        if plan.len() == 1 {
            let _ = progress
                .send(StepProgress::new(
                    5.0,
                    format!(
                        "demucs: separating ({})",
                        if gpu_requested { "cuda" } else { "cpu" }
                    ),
                ))
                .await;
            self.run_with_fallback(
                wav_in,
                out_dir,
                gpu_requested,
                &cpu_fallback,
                &progress,
                cancel,
            )
            .await?;
            let vocal = require_vocal(self.vocal_path(out_dir, wav_in)).await?;
            let _ = progress
                .send(StepProgress::new(100.0, "demucs: complete"))
                .await;
            return Ok(vocal);
        }

        let cpu_fallback = &cpu_fallback;
        run_segmented(
            WHICH,
            self.tools.as_ref(),
            wav_in,
            out_dir,
            duration,
            self.config.segment_len_secs,
            self.config.demucs_workers,
            // A single bad chunk in a long run becomes silence instead of
            // sinking the whole driver.
            SegmentFailurePolicy::Silence,
            &progress,
            cancel,
            |_, slice_path| {
                let progress = progress.clone();
                async move {
                    self.run_with_fallback(
                        &slice_path,
                        out_dir,
                        gpu_requested,
                        cpu_fallback,
                        &progress,
                        cancel,
                    )
                    .await?;
                    require_vocal(self.vocal_path(out_dir, &slice_path)).await
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocal_path_includes_model_dir() {
        let driver = DemucsDriver::new(
            Arc::new(crate::media::MediaTools::new(
                "ffmpeg".into(),
                "ffprobe".into(),
            )),
            SeparatorConfig::default(),
        );
        let vocal = driver.vocal_path(Path::new("/work/demucs"), Path::new("/tmp/part_002.wav"));
        assert_eq!(
            vocal,
            PathBuf::from("/work/demucs/htdemucs/part_002/vocals.wav")
        );
    }
}
