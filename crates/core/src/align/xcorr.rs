//! Envelope cross-correlation lag estimation.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

use super::aligner::AlignConfig;

/// Outcome of a lag estimate.
#[derive(Debug, Clone, Copy)]
pub struct LagEstimate {
    /// Positive: `a` is delayed relative to `b` (`b` starts earlier).
    pub lag_samples: i64,
    /// 0–1; below the configured threshold the lag is forced to zero.
    pub confidence: f32,
    /// Whether the estimate was rejected and zeroed.
    pub low_confidence: bool,
}

/// Length of the leading run of samples below the silence floor, capped.
fn leading_silence(samples: &[f32], sample_rate: u32, config: &AlignConfig) -> usize {
    let floor = 10f32.powf(config.silence_floor_db / 20.0);
    let cap = (config.silence_max_secs * sample_rate as f64) as usize;
    samples
        .iter()
        .take(cap)
        .take_while(|s| s.abs() < floor)
        .count()
}

/// Smoothed, normalized amplitude envelope (50 ms moving average).
fn envelope(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let win = ((sample_rate as f64 * 0.05) as usize).max(1);
    let mut env: Vec<f32> = Vec::with_capacity(samples.len());

    // Running-sum moving average over |x|, centered like a convolution
    // with mode "same".
    let half = win / 2;
    let abs: Vec<f32> = samples.iter().map(|s| s.abs()).collect();
    let mut running = 0.0f64;
    let mut left = 0usize;
    let mut right = 0usize;
    for i in 0..abs.len() {
        let want_right = (i + half + 1).min(abs.len());
        while right < want_right {
            running += abs[right] as f64;
            right += 1;
        }
        let want_left = i.saturating_sub(win - half - 1);
        while left < want_left {
            running -= abs[left] as f64;
            left += 1;
        }
        env.push((running / (right - left) as f64) as f32);
    }

    let mean = env.iter().sum::<f32>() / env.len().max(1) as f32;
    for v in env.iter_mut() {
        *v -= mean;
    }
    let std = (env.iter().map(|v| v * v).sum::<f32>() / env.len().max(1) as f32).sqrt();
    if std > 0.0 {
        for v in env.iter_mut() {
            *v /= std;
        }
    }
    env
}

/// Circular cross-correlation c[m] = Σ_i a[(i+m) mod n] · b[i] via FFT.
fn circular_xcorr(a: &[f32], b: &[f32]) -> Vec<f32> {
    let n = (a.len() + b.len()).next_power_of_two();
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut a_pad = vec![0.0f32; n];
    a_pad[..a.len()].copy_from_slice(a);
    let mut b_pad = vec![0.0f32; n];
    b_pad[..b.len()].copy_from_slice(b);

    let mut a_hat = fft.make_output_vec();
    let mut b_hat = fft.make_output_vec();
    // Input buffers are scratch after processing.
    fft.process(&mut a_pad, &mut a_hat).expect("fft size matches");
    fft.process(&mut b_pad, &mut b_hat).expect("fft size matches");

    let mut spectrum: Vec<Complex<f32>> = a_hat
        .iter()
        .zip(b_hat.iter())
        .map(|(x, y)| x * y.conj())
        .collect();

    let mut out = vec![0.0f32; n];
    ifft.process(&mut spectrum, &mut out)
        .expect("fft size matches");

    let scale = 1.0 / n as f32;
    for v in out.iter_mut() {
        *v *= scale;
    }
    out
}

/// Estimate the lag between two mono signals at a shared sample rate.
///
/// Both signals are windowed to the configured analysis length after a
/// symmetric leading-silence trim: the smaller of the two silence runs is
/// removed from both, so a genuine offset survives trimming.
pub fn estimate_lag(a: &[f32], b: &[f32], sample_rate: u32, config: &AlignConfig) -> LagEstimate {
    let trim = leading_silence(a, sample_rate, config)
        .min(leading_silence(b, sample_rate, config));

    let window = (config.window_secs * sample_rate as f64) as usize;
    let a_win = &a[trim.min(a.len())..(trim + window).min(a.len())];
    let b_win = &b[trim.min(b.len())..(trim + window).min(b.len())];

    if a_win.is_empty() || b_win.is_empty() {
        return LagEstimate {
            lag_samples: 0,
            confidence: 0.0,
            low_confidence: true,
        };
    }

    let env_a = envelope(a_win, sample_rate);
    let env_b = envelope(b_win, sample_rate);

    let corr = circular_xcorr(&env_a, &env_b);
    let n = corr.len() as i64;
    let max_lag = (config.max_lag_secs * sample_rate as f64) as i64;
    let max_lag = max_lag.min(n / 2 - 1).max(1);

    let mut peak_lag = 0i64;
    let mut peak_abs = 0.0f32;
    let mut sum_abs = 0.0f64;
    let mut count = 0u64;
    for lag in -max_lag..=max_lag {
        let idx = lag.rem_euclid(n) as usize;
        let value = corr[idx].abs();
        sum_abs += value as f64;
        count += 1;
        if value > peak_abs {
            peak_abs = value;
            peak_lag = lag;
        }
    }

    let mean_abs = (sum_abs / count.max(1) as f64) as f32;
    let confidence = if mean_abs > 0.0 {
        (peak_abs / (mean_abs * 10.0)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    if confidence < config.confidence_threshold {
        return LagEstimate {
            lag_samples: 0,
            confidence,
            low_confidence: true,
        };
    }

    LagEstimate {
        lag_samples: peak_lag,
        confidence,
        low_confidence: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AlignConfig {
        AlignConfig::default()
    }

    /// Deterministic pseudo-noise so the correlation has structure.
    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0
            })
            .collect()
    }

    #[test]
    fn test_identity_signal_zero_lag_high_confidence() {
        let sr = 8000;
        let a = noise(sr as usize * 4, 7);
        let estimate = estimate_lag(&a, &a, sr, &test_config());
        assert_eq!(estimate.lag_samples, 0);
        assert!(!estimate.low_confidence);
        assert!(estimate.confidence >= 0.95, "confidence {}", estimate.confidence);
    }

    #[test]
    fn test_detects_known_shift() {
        let sr = 8000;
        let base = noise(sr as usize * 4, 42);
        let shift = 400usize; // 50 ms at 8 kHz

        // a = base delayed by `shift` samples
        let mut a = vec![0.0f32; shift];
        a.extend_from_slice(&base);
        let b = base.clone();

        let estimate = estimate_lag(&a, &b, sr, &test_config());
        assert!(!estimate.low_confidence);
        // Envelope smoothing costs a little precision; 50 ms window at 8 kHz.
        assert!(
            (estimate.lag_samples - shift as i64).abs() <= (sr as i64 / 100),
            "estimated {} expected {}",
            estimate.lag_samples,
            shift
        );
    }

    #[test]
    fn test_silence_vs_silence_is_rejected() {
        let sr = 8000;
        let a = vec![0.0f32; sr as usize];
        let estimate = estimate_lag(&a, &a, sr, &test_config());
        assert_eq!(estimate.lag_samples, 0);
        assert!(estimate.low_confidence);
    }

    #[test]
    fn test_leading_silence_measurement() {
        let sr = 1000;
        let config = test_config();
        let mut samples = vec![0.0f32; 500];
        samples.extend(vec![0.5f32; 500]);
        assert_eq!(leading_silence(&samples, sr, &config), 500);

        // Cap applies
        let long_silence = vec![0.0f32; sr as usize * 10];
        assert_eq!(
            leading_silence(&long_silence, sr, &config),
            (config.silence_max_secs * sr as f64) as usize
        );
    }

    #[test]
    fn test_circular_xcorr_peak_at_shift() {
        // b shifted into a by 3 → peak at lag 3
        let b = vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut a = vec![0.0; 8];
        a[3] = 1.0;
        a[4] = 2.0;
        a[5] = 3.0;
        let corr = circular_xcorr(&a, &b);
        let peak_idx = corr
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.partial_cmp(y.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak_idx, 3);
    }
}
