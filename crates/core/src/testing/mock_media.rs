//! Mock media toolkit: no ffmpeg required.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::align::{read_wav, write_wav, AudioBuffer};
use crate::cmd::CancelFlag;
use crate::media::{
    is_video_file, AudioTrack, ExtractOptions, MediaError, MediaProbe, MediaToolkit, RemuxSettings,
};

use super::test_signal;

/// Controllable [`MediaToolkit`] that works on real WAV data where the
/// pipeline needs it (slice/concat operate on samples, transforms copy
/// bytes through), so end-to-end pipeline tests run without the toolchain.
pub struct MockMediaToolkit {
    probe_results: RwLock<HashMap<PathBuf, MediaProbe>>,
    default_duration: RwLock<f64>,
    next_error: Mutex<Option<MediaError>>,
}

impl Default for MockMediaToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaToolkit {
    pub fn new() -> Self {
        Self {
            probe_results: RwLock::new(HashMap::new()),
            default_duration: RwLock::new(10.0),
            next_error: Mutex::new(None),
        }
    }

    pub async fn set_probe_result(&self, path: impl AsRef<Path>, probe: MediaProbe) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), probe);
    }

    pub async fn set_default_duration(&self, secs: f64) {
        *self.default_duration.write().await = secs;
    }

    pub async fn set_next_error(&self, error: MediaError) {
        *self.next_error.lock().await = Some(error);
    }

    async fn take_error(&self) -> Option<MediaError> {
        self.next_error.lock().await.take()
    }

    fn default_probe(path: &Path, duration: f64) -> MediaProbe {
        let is_video = is_video_file(path);
        MediaProbe {
            duration_s: duration,
            is_video,
            video_codec: is_video.then(|| "h264".to_string()),
            audio_codec: Some("aac".to_string()),
            resolution: is_video.then(|| "1920x1080".to_string()),
            audio_tracks: vec![AudioTrack {
                index: if is_video { 1 } else { 0 },
                language: "unknown".to_string(),
                codec: Some("aac".to_string()),
            }],
        }
    }

    fn check(cancel: &CancelFlag) -> Result<(), MediaError> {
        if cancel.is_cancelled() {
            Err(MediaError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn copy(input: &Path, output: &Path) -> Result<(), MediaError> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaToolkit for MockMediaToolkit {
    async fn probe(&self, path: &Path) -> Result<MediaProbe, MediaError> {
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        if !path.exists() {
            return Err(MediaError::InvalidInput {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }
        if let Some(probe) = self.probe_results.read().await.get(path) {
            return Ok(probe.clone());
        }
        Ok(Self::default_probe(path, *self.default_duration.read().await))
    }

    async fn duration(&self, path: &Path) -> Result<f64, MediaError> {
        // Real WAVs written by other mocks report their true duration so
        // segmentation logic sees consistent numbers.
        if let Ok(buffer) = read_wav(path) {
            return Ok(buffer.duration_secs());
        }
        Ok(self.probe(path).await?.duration_s)
    }

    async fn extract_wav(
        &self,
        _input: &Path,
        output: &Path,
        _options: &ExtractOptions,
        cancel: &CancelFlag,
        progress: Option<(f64, mpsc::Sender<f32>)>,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        let buffer = test_signal(4000, 2, 7);
        write_wav(output, &buffer).map_err(|e| MediaError::ExtractFailed {
            stderr_tail: e.to_string(),
        })?;
        if let Some((_, tx)) = progress {
            let _ = tx.try_send(100.0);
        }
        Ok(())
    }

    async fn slice_wav(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        len_secs: f64,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        let buffer = read_wav(input).map_err(|e| MediaError::SegmentFailed {
            stderr_tail: e.to_string(),
        })?;
        let ch = buffer.channels as usize;
        let start = ((start_secs * buffer.sample_rate as f64) as usize * ch).min(buffer.samples.len());
        let end = (start + (len_secs * buffer.sample_rate as f64) as usize * ch)
            .min(buffer.samples.len());
        let slice = AudioBuffer {
            samples: buffer.samples[start..end].to_vec(),
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
        };
        write_wav(output, &slice).map_err(|e| MediaError::SegmentFailed {
            stderr_tail: e.to_string(),
        })
    }

    async fn silence_of(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        let buffer = read_wav(input).map_err(|e| MediaError::SegmentFailed {
            stderr_tail: e.to_string(),
        })?;
        let silent = AudioBuffer {
            samples: vec![0.0; buffer.samples.len()],
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
        };
        write_wav(output, &silent).map_err(|e| MediaError::SegmentFailed {
            stderr_tail: e.to_string(),
        })
    }

    async fn concat(
        &self,
        parts: &[PathBuf],
        _list_dir: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        let mut joined: Option<AudioBuffer> = None;
        for part in parts {
            let buffer = read_wav(part).map_err(|e| MediaError::SegmentFailed {
                stderr_tail: e.to_string(),
            })?;
            match &mut joined {
                None => joined = Some(buffer),
                Some(acc) => acc.samples.extend_from_slice(&buffer.samples),
            }
        }
        let joined = joined.ok_or_else(|| MediaError::SegmentFailed {
            stderr_tail: "nothing to concatenate".to_string(),
        })?;
        write_wav(output, &joined).map_err(|e| MediaError::SegmentFailed {
            stderr_tail: e.to_string(),
        })
    }

    async fn loudness_normalize(
        &self,
        input: &Path,
        output: &Path,
        _audio_bitrate: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Self::copy(input, output).await
    }

    async fn remux_video(
        &self,
        _original: &Path,
        vocals: &Path,
        output: &Path,
        _settings: &RemuxSettings,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Self::copy(vocals, output).await
    }

    async fn encode_audio_final(
        &self,
        input: &Path,
        output: &Path,
        _audio_bitrate: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError> {
        Self::check(cancel)?;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Self::copy(input, output).await
    }
}
