//! Test doubles for the subprocess-backed components.
//!
//! The mocks write real (tiny) WAV files so the in-process alignment and
//! mixing paths run against them unchanged.

mod mock_downloader;
mod mock_media;
mod mock_separator;

pub use mock_downloader::MockDownloader;
pub use mock_media::MockMediaToolkit;
pub use mock_separator::MockSeparator;

use crate::align::AudioBuffer;

/// Deterministic pseudo-noise used by every mock that writes audio, so two
/// mocks with the same seed produce correlated signals.
pub fn test_signal(frames: usize, channels: u16, seed: u64) -> AudioBuffer {
    let mut state = seed;
    let samples = (0..frames * channels as usize)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0) * 0.5
        })
        .collect();
    AudioBuffer {
        samples,
        channels,
        sample_rate: 8000,
    }
}
