//! WAV loading and saving for the in-process alignment path.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use super::AlignError;

/// Interleaved f32 samples plus layout.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Mono downmix (mean over channels), used for correlation only.
    pub fn mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let ch = self.channels as usize;
        self.samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }
}

pub fn read_wav(path: &Path) -> Result<AudioBuffer, AlignError> {
    let reader = WavReader::open(path).map_err(|e| AlignError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect(),
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect()
        }
    };

    let samples = samples.map_err(|e| AlignError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(AudioBuffer {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

/// Write as 32-bit float WAV (what the separators emit downstream of us).
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> Result<(), AlignError> {
    let spec = WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| AlignError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    for &sample in &buffer.samples {
        writer.write_sample(sample).map_err(|e| AlignError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    writer.finalize().map_err(|e| AlignError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_stereo() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.wav");
        let buffer = AudioBuffer {
            samples: vec![0.0, 0.5, -0.5, 0.25, 1.0, -1.0],
            channels: 2,
            sample_rate: 44100,
        };
        write_wav(&path, &buffer).unwrap();

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.channels, 2);
        assert_eq!(loaded.sample_rate, 44100);
        assert_eq!(loaded.frames(), 3);
        for (a, b) in loaded.samples.iter().zip(buffer.samples.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mono_downmix() {
        let buffer = AudioBuffer {
            samples: vec![1.0, 0.0, 0.0, 1.0],
            channels: 2,
            sample_rate: 44100,
        };
        let mono = buffer.mono();
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer {
            samples: vec![0.0; 44100 * 2],
            channels: 2,
            sample_rate: 44100,
        };
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_wav(Path::new("/nonexistent/x.wav")).unwrap_err();
        assert!(matches!(err, AlignError::Read { .. }));
    }
}
