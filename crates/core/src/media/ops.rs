//! ffmpeg command construction and execution.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use crate::cmd::{self, CancelFlag};
use crate::tools::{ToolError, ToolKind, ToolLocator};

use super::error::{FailureKind, MediaError};
use super::probe::parse_probe_output;
use super::traits::MediaToolkit;
use super::types::MediaProbe;

/// EBU R128 targets for the loudness pass (the values the service has
/// always shipped with).
const LOUDNORM_I: &str = "-23";
const LOUDNORM_TP: &str = "-2";
const LOUDNORM_LRA: &str = "7";

/// Options for the WAV extraction step.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Container stream index to extract (`-map 0:<index>`); first audio
    /// stream when unset.
    pub track_index: Option<u32>,
    /// Process only the first N seconds.
    pub duration_limit: Option<f64>,
}

/// Settings for the final remux, derived from the active preset.
#[derive(Debug, Clone)]
pub struct RemuxSettings {
    pub video_codec: String,
    pub video_bitrate: Option<String>,
    pub audio_codec: String,
    pub audio_bitrate: Option<String>,
    pub container: String,
}

/// Resolved ffmpeg/ffprobe pair plus per-process encoder capabilities.
pub struct MediaTools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    fdk_aac: OnceCell<bool>,
}

impl MediaTools {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            fdk_aac: OnceCell::new(),
        }
    }

    /// Resolve both binaries through the locator.
    pub async fn from_locator(locator: &ToolLocator) -> Result<Self, ToolError> {
        let ffmpeg = locator.locate(ToolKind::Ffmpeg).await?;
        let ffprobe = locator.locate(ToolKind::Ffprobe).await?;
        Ok(Self::new(ffmpeg, ffprobe))
    }

    /// Prefer libfdk_aac when the local ffmpeg carries it.
    async fn aac_encoder(&self) -> &'static str {
        let has_fdk = *self
            .fdk_aac
            .get_or_init(|| async {
                let args = vec!["-encoders".to_string()];
                match cmd::run(&self.ffmpeg, &args, &CancelFlag::new(), None).await {
                    Ok(out) => out.stdout.contains("libfdk_aac"),
                    Err(_) => false,
                }
            })
            .await;
        if has_fdk {
            "libfdk_aac"
        } else {
            "aac"
        }
    }

    async fn run_ffprobe(&self, args: Vec<String>, path: &Path) -> Result<String, MediaError> {
        let out = cmd::run(&self.ffprobe, &args, &CancelFlag::new(), None)
            .await
            .map_err(|e| match e {
                cmd::CmdError::NonZeroExit { stderr_tail, .. } => MediaError::ProbeFailed {
                    path: path.to_path_buf(),
                    stderr_tail,
                },
                cmd::CmdError::Io(io) => MediaError::Io(io),
                other => MediaError::ProbeFailed {
                    path: path.to_path_buf(),
                    stderr_tail: other.to_string(),
                },
            })?;
        Ok(out.stdout)
    }

    /// Run ffmpeg, optionally parsing `-progress` output into percentages.
    async fn run_ffmpeg(
        &self,
        args: &[String],
        cancel: &CancelFlag,
        progress: Option<(f64, mpsc::Sender<f32>)>,
        failure: FailureKind,
    ) -> Result<(), MediaError> {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let Some((duration_secs, tx)) = progress else {
            return cmd::run(&self.ffmpeg, args, cancel, None)
                .await
                .map(|_| ())
                .map_err(|e| MediaError::from_cmd(e, failure));
        };

        // Progress variant: stream stderr lines and map out_time onto the
        // known input duration.
        let mut full_args = args.to_vec();
        let out_arg = full_args.pop().expect("output path is last");
        full_args.extend([
            "-loglevel".to_string(),
            "warning".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
            out_arg,
        ]);

        debug!(?full_args, "ffmpeg with progress");
        let mut child = cmd::command(&self.ffmpeg, &full_args)
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| {
                MediaError::from_cmd(
                    cmd::CmdError::Spawn {
                        program: "ffmpeg".to_string(),
                        source: e,
                    },
                    failure,
                )
            })?;

        let stderr = child.stderr.take().expect("stderr is piped");
        let mut reader = BufReader::new(stderr).lines();
        let time_regex = Regex::new(r"out_time_ms=(\d+)").expect("static regex");
        let mut stderr_buf = String::new();

        loop {
            tokio::select! {
                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(caps) = time_regex.captures(&line) {
                            if let Ok(us) = caps[1].parse::<f64>() {
                                if duration_secs > 0.0 {
                                    let pct = ((us / 1_000_000.0) / duration_secs * 100.0)
                                        .clamp(0.0, 100.0);
                                    let _ = tx.try_send(pct as f32);
                                }
                            }
                        } else if !line.starts_with("progress=") {
                            stderr_buf.push_str(&line);
                            stderr_buf.push('\n');
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => {
                    cmd::terminate(&mut child, "ffmpeg").await;
                    return Err(MediaError::Cancelled);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(MediaError::from_cmd(
                cmd::CmdError::NonZeroExit {
                    program: "ffmpeg".to_string(),
                    code: status.code(),
                    stderr_tail: cmd::stderr_tail(&stderr_buf),
                },
                failure,
            ));
        }

        let _ = tx.try_send(100.0);
        Ok(())
    }
}

#[async_trait]
impl MediaToolkit for MediaTools {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, MediaError> {
        if !path.exists() {
            return Err(MediaError::InvalidInput {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let stdout = self.run_ffprobe(args, path).await?;
        parse_probe_output(path, &stdout)
    }

    async fn duration(&self, path: &Path) -> Result<f64, MediaError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let stdout = self.run_ffprobe(args, path).await?;
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|_| MediaError::ProbeFailed {
                path: path.to_path_buf(),
                stderr_tail: format!("non-numeric duration: {:?}", stdout.trim()),
            })
    }

    async fn extract_wav(
        &self,
        input: &Path,
        output: &Path,
        options: &ExtractOptions,
        cancel: &CancelFlag,
        progress: Option<(f64, mpsc::Sender<f32>)>,
    ) -> Result<(), MediaError> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        if let Some(limit) = options.duration_limit {
            args.extend(["-t".to_string(), format!("{limit}")]);
        }
        if let Some(index) = options.track_index {
            args.extend(["-map".to_string(), format!("0:{index}")]);
        }

        args.extend([
            "-vn".to_string(),
            "-ac".to_string(),
            "2".to_string(),
            "-ar".to_string(),
            "44100".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
        ]);
        args.push(output.to_string_lossy().to_string());

        self.run_ffmpeg(&args, cancel, progress, FailureKind::Extract)
            .await
    }

    async fn slice_wav(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        len_secs: f64,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-ss".to_string(),
            format!("{start_secs}"),
            "-t".to_string(),
            format!("{len_secs}"),
            output.to_string_lossy().to_string(),
        ];
        self.run_ffmpeg(&args, cancel, None, FailureKind::Segment)
            .await
    }

    async fn silence_of(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        let args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-af".to_string(),
            "volume=0".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.run_ffmpeg(&args, cancel, None, FailureKind::Segment)
            .await
    }

    async fn concat(
        &self,
        parts: &[PathBuf],
        list_dir: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        let list_path = list_dir.join("concat_list.txt");
        let mut list = String::new();
        for part in parts {
            let absolute = if part.is_absolute() {
                part.clone()
            } else {
                std::env::current_dir()?.join(part)
            };
            // concat demuxer quoting: single quotes with '\'' escapes
            let escaped = absolute.to_string_lossy().replace('\'', r"'\''");
            list.push_str(&format!("file '{escaped}'\n"));
        }
        tokio::fs::write(&list_path, list).await?;

        let args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_path.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ];
        self.run_ffmpeg(&args, cancel, None, FailureKind::Segment)
            .await
    }

    /// Pass 1 measures, pass 2 applies the measured values linearly. If the
    /// measurement output cannot be parsed, pass 2 falls back to the
    /// one-pass filter rather than failing the job.
    async fn loudness_normalize(
        &self,
        input: &Path,
        output: &Path,
        audio_bitrate: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        let measure_args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-af".to_string(),
            format!(
                "loudnorm=I={LOUDNORM_I}:TP={LOUDNORM_TP}:LRA={LOUDNORM_LRA}:print_format=json"
            ),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        let stats = match cmd::run(&self.ffmpeg, &measure_args, cancel, None).await {
            Ok(out) => parse_loudnorm_stats(&out.stderr),
            Err(cmd::CmdError::Cancelled) => return Err(MediaError::Cancelled),
            Err(e) => {
                warn!("loudnorm measurement pass failed: {e}");
                None
            }
        };

        let filter = match &stats {
            Some(s) => format!(
                "loudnorm=I={LOUDNORM_I}:TP={LOUDNORM_TP}:LRA={LOUDNORM_LRA}:\
                 measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:\
                 offset={}:linear=true",
                s.input_i, s.input_tp, s.input_lra, s.input_thresh, s.target_offset
            ),
            None => format!("loudnorm=I={LOUDNORM_I}:TP={LOUDNORM_TP}:LRA={LOUDNORM_LRA}"),
        };

        let codec = self.aac_encoder().await;
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-af".to_string(),
            filter,
            "-ar".to_string(),
            "44100".to_string(),
            "-c:a".to_string(),
            codec.to_string(),
            "-b:a".to_string(),
            audio_bitrate.unwrap_or("192k").to_string(),
        ];
        args.push(output.to_string_lossy().to_string());

        self.run_ffmpeg(&args, cancel, None, FailureKind::Normalize)
            .await
    }

    async fn remux_video(
        &self,
        original: &Path,
        vocals: &Path,
        output: &Path,
        settings: &RemuxSettings,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        let mut args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            original.to_string_lossy().to_string(),
            "-i".to_string(),
            vocals.to_string_lossy().to_string(),
            "-c:v".to_string(),
            settings.video_codec.clone(),
        ];
        if settings.video_codec != "copy" {
            if let Some(bitrate) = &settings.video_bitrate {
                args.extend(["-b:v".to_string(), bitrate.clone()]);
            }
        }

        args.extend(["-c:a".to_string(), settings.audio_codec.clone()]);
        if let Some(bitrate) = &settings.audio_bitrate {
            args.extend(["-b:a".to_string(), bitrate.clone()]);
        }

        args.extend([
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
            "-shortest".to_string(),
            "-f".to_string(),
            settings.container.clone(),
        ]);
        args.push(output.to_string_lossy().to_string());

        self.run_ffmpeg(&args, cancel, None, FailureKind::Remux)
            .await
    }

    async fn encode_audio_final(
        &self,
        input: &Path,
        output: &Path,
        audio_bitrate: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        let ext = output
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut args = vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];

        match ext.as_str() {
            "flac" => args.extend(["-c:a".to_string(), "flac".to_string()]),
            "wav" => args.extend(["-c:a".to_string(), "pcm_s16le".to_string()]),
            "m4a" | "aac" => {
                let codec = self.aac_encoder().await;
                args.extend(["-c:a".to_string(), codec.to_string()]);
                if let Some(bitrate) = audio_bitrate {
                    args.extend(["-b:a".to_string(), bitrate.to_string()]);
                }
            }
            _ => {
                args.extend(["-c:a".to_string(), "libmp3lame".to_string()]);
                if let Some(bitrate) = audio_bitrate {
                    args.extend(["-b:a".to_string(), bitrate.to_string()]);
                }
            }
        }
        args.push(output.to_string_lossy().to_string());

        self.run_ffmpeg(&args, cancel, None, FailureKind::Remux)
            .await
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct LoudnormStats {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
    target_offset: String,
}

/// Extract the JSON stats block loudnorm prints at the end of pass 1.
fn parse_loudnorm_stats(stderr: &str) -> Option<LoudnormStats> {
    let start = stderr.rfind('{')?;
    let end = stderr[start..].find('}')? + start + 1;
    match serde_json::from_str::<LoudnormStats>(&stderr[start..end]) {
        Ok(stats) => Some(stats),
        Err(e) => {
            info!("could not parse loudnorm stats: {e}");
            None
        }
    }
}
