//! Equal-weight mixing with a per-channel limiter.

use std::path::{Path, PathBuf};
use tracing::info;

use super::wav::{read_wav, write_wav, AudioBuffer};
use super::AlignError;

/// Mix two aligned vocal tracks into one.
///
/// Equal 0.5/0.5 weights, then each channel is scaled down only if its peak
/// exceeds 0 dBFS. Output duration is the longer of the two inputs; channel
/// count and sample rate are preserved.
pub fn mix_files(a_path: &Path, b_path: &Path, out_path: &Path) -> Result<PathBuf, AlignError> {
    let a = read_wav(a_path)?;
    let b = read_wav(b_path)?;

    if a.sample_rate != b.sample_rate {
        return Err(AlignError::MixFailed {
            reason: format!("sample rates differ: {} vs {}", a.sample_rate, b.sample_rate),
        });
    }
    if a.channels != b.channels {
        return Err(AlignError::MixFailed {
            reason: format!("channel counts differ: {} vs {}", a.channels, b.channels),
        });
    }

    let ch = a.channels as usize;
    let frames = a.frames().max(b.frames());
    let mut mixed = vec![0.0f32; frames * ch];

    for (i, slot) in mixed.iter_mut().enumerate() {
        let sa = a.samples.get(i).copied().unwrap_or(0.0);
        let sb = b.samples.get(i).copied().unwrap_or(0.0);
        *slot = 0.5 * sa + 0.5 * sb;
    }

    // Per-channel limiter at 0 dBFS.
    for c in 0..ch {
        let peak = mixed
            .iter()
            .skip(c)
            .step_by(ch)
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        if peak > 1.0 {
            info!(channel = c, peak, "limiting channel to 0 dBFS");
            let scale = 1.0 / peak;
            for s in mixed.iter_mut().skip(c).step_by(ch) {
                *s *= scale;
            }
        }
    }

    write_wav(
        out_path,
        &AudioBuffer {
            samples: mixed,
            channels: a.channels,
            sample_rate: a.sample_rate,
        },
    )?;

    Ok(out_path.to_path_buf())
}
