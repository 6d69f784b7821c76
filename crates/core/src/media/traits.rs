//! The media toolkit contract.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::cmd::CancelFlag;

use super::error::MediaError;
use super::ops::{ExtractOptions, RemuxSettings};
use super::types::MediaProbe;

/// Every audio/video transformation the pipeline performs.
///
/// The production implementation shells out to ffmpeg/ffprobe; tests swap
/// in a mock so pipeline behavior can be exercised without the toolchain.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Full metadata probe.
    async fn probe(&self, path: &Path) -> Result<MediaProbe, MediaError>;

    /// Cheap duration-only probe.
    async fn duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Decode + resample to 44.1 kHz stereo PCM WAV. `progress` carries
    /// the known input duration and a percentage channel.
    async fn extract_wav(
        &self,
        input: &Path,
        output: &Path,
        options: &ExtractOptions,
        cancel: &CancelFlag,
        progress: Option<(f64, mpsc::Sender<f32>)>,
    ) -> Result<(), MediaError>;

    /// Cut `[start, start + len)` seconds out of a WAV.
    async fn slice_wav(
        &self,
        input: &Path,
        output: &Path,
        start_secs: f64,
        len_secs: f64,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError>;

    /// Render a silent copy of a WAV (same duration and layout).
    async fn silence_of(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError>;

    /// Join WAV parts in order, losslessly.
    async fn concat(
        &self,
        parts: &[PathBuf],
        list_dir: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError>;

    /// Two-pass EBU R128 loudness normalization, encoding to AAC.
    async fn loudness_normalize(
        &self,
        input: &Path,
        output: &Path,
        audio_bitrate: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError>;

    /// Combine the processed vocal track with the original video stream.
    async fn remux_video(
        &self,
        original: &Path,
        vocals: &Path,
        output: &Path,
        settings: &RemuxSettings,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError>;

    /// Write an audio-only final file, codec chosen from the extension.
    async fn encode_audio_final(
        &self,
        input: &Path,
        output: &Path,
        audio_bitrate: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<(), MediaError>;
}
