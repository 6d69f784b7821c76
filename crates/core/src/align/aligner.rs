//! File-level alignment: estimate lag, pad the earlier stream, save both.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::wav::{read_wav, write_wav, AudioBuffer};
use super::xcorr::estimate_lag;
use super::AlignError;

/// Tunables for lag estimation. Defaults are the documented contract:
/// 30 s analysis window, −50 dBFS silence floor for at most 5 s,
/// ±2 s maximum lag, 0.2 confidence threshold.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlignConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
    #[serde(default = "default_max_lag_secs")]
    pub max_lag_secs: f64,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_silence_floor_db")]
    pub silence_floor_db: f32,
    #[serde(default = "default_silence_max_secs")]
    pub silence_max_secs: f64,
}

fn default_window_secs() -> f64 {
    30.0
}

fn default_max_lag_secs() -> f64 {
    2.0
}

fn default_confidence_threshold() -> f32 {
    0.2
}

fn default_silence_floor_db() -> f32 {
    -50.0
}

fn default_silence_max_secs() -> f64 {
    5.0
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_lag_secs: default_max_lag_secs(),
            confidence_threshold: default_confidence_threshold(),
            silence_floor_db: default_silence_floor_db(),
            silence_max_secs: default_silence_max_secs(),
        }
    }
}

/// Outcome of aligning two vocal files.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentResult {
    pub lag_samples: i64,
    pub lag_seconds: f64,
    pub confidence: f32,
    pub sample_rate: u32,
    pub aligned_a_path: PathBuf,
    pub aligned_b_path: PathBuf,
    /// True when the estimate was rejected and no shift was applied.
    pub low_confidence: bool,
}

/// Left-pad with `pad` frames of silence.
fn pad_front(buffer: &AudioBuffer, pad: usize) -> AudioBuffer {
    let ch = buffer.channels as usize;
    let mut samples = vec![0.0f32; pad * ch];
    samples.extend_from_slice(&buffer.samples);
    AudioBuffer {
        samples,
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
    }
}

/// Pad the tail with silence until the buffer holds `frames` frames.
fn pad_to_frames(buffer: &mut AudioBuffer, frames: usize) {
    let want = frames * buffer.channels as usize;
    if buffer.samples.len() < want {
        buffer.samples.resize(want, 0.0);
    }
}

/// Align two WAV files and write padded copies.
///
/// Synchronous (WAV decode + FFT); callers on the runtime wrap it in
/// `spawn_blocking`. The correction only ever pads: positive lag means `a`
/// starts later, so `b` gets the leading silence.
pub fn align_files(
    a_path: &Path,
    b_path: &Path,
    out_a: &Path,
    out_b: &Path,
    config: &AlignConfig,
) -> Result<AlignmentResult, AlignError> {
    let a = read_wav(a_path)?;
    let b = read_wav(b_path)?;

    let sample_rate = a.sample_rate;
    let estimate = estimate_lag(&a.mono(), &b.mono(), sample_rate, config);
    let lag_seconds = estimate.lag_samples as f64 / sample_rate as f64;

    if estimate.low_confidence {
        warn!(
            confidence = estimate.confidence,
            "weak correlation, keeping streams unshifted"
        );
    } else if estimate.lag_samples != 0 {
        info!(
            lag_samples = estimate.lag_samples,
            lag_ms = lag_seconds * 1000.0,
            "applying alignment shift"
        );
    }

    let shift = estimate.lag_samples.unsigned_abs() as usize;
    let (mut aligned_a, mut aligned_b) = if estimate.lag_samples > 0 {
        // `a` is delayed; `b` starts earlier and gets the padding.
        (a, pad_front(&b, shift))
    } else if estimate.lag_samples < 0 {
        (pad_front(&a, shift), b)
    } else {
        (a, b)
    };

    let frames = aligned_a.frames().max(aligned_b.frames());
    pad_to_frames(&mut aligned_a, frames);
    pad_to_frames(&mut aligned_b, frames);

    write_wav(out_a, &aligned_a)?;
    write_wav(out_b, &aligned_b)?;

    Ok(AlignmentResult {
        lag_samples: estimate.lag_samples,
        lag_seconds,
        confidence: estimate.confidence,
        sample_rate,
        aligned_a_path: out_a.to_path_buf(),
        aligned_b_path: out_b.to_path_buf(),
        low_confidence: estimate.low_confidence,
    })
}
