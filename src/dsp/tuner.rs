//! Pitch estimation for live input windows.
//!
//! Uses the McLeod pitch method: a normalized square difference function
//! (NSDF, autocorrelation family) whose key maxima are peak-picked and
//! refined with parabolic interpolation. The height of the chosen peak is
//! the clarity, a periodicity score in [0, 1].

/// Fraction of the highest key maximum a peak must reach to be chosen.
const PEAK_THRESHOLD: f64 = 0.9;

/// Estimated fundamental of one analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Estimated fundamental frequency in Hz.
    pub frequency: f64,
    /// Periodicity in [0, 1]; higher is cleaner.
    pub clarity: f64,
}

/// Root-mean-square amplitude of a window.
pub fn rms(window: &[f32]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / window.len() as f64).sqrt()
}

/// Estimate the fundamental of `window`.
///
/// - `sample_rate`: input sample rate in Hz
/// - `min_freq`: lowest frequency worth searching for; bounds the lag range
///
/// Returns `None` when the window is too short or has no usable peak.
pub fn estimate_pitch(window: &[f32], sample_rate: u32, min_freq: f64) -> Option<PitchEstimate> {
    let sr = sample_rate as f64;
    let n = window.len();
    if n < 4 || sr <= 0.0 || min_freq <= 0.0 {
        return None;
    }

    let max_lag = ((sr / min_freq).ceil() as usize + 2).min(n / 2);
    let nsdf = normalized_square_difference(window, max_lag);

    let peaks = key_maxima(&nsdf);
    let highest = peaks.iter().map(|&t| nsdf[t]).fold(f64::MIN, f64::max);
    if peaks.is_empty() || highest <= 0.0 {
        return None;
    }

    let threshold = PEAK_THRESHOLD * highest;
    let tau = *peaks.iter().find(|&&t| nsdf[t] >= threshold)?;

    // Parabolic interpolation for sub-sample accuracy
    let (alpha, beta, gamma) = (nsdf[tau - 1], nsdf[tau], nsdf[tau + 1]);
    let denom = alpha - 2.0 * beta + gamma;
    let (tau_refined, peak) = if denom.abs() > 1e-12 {
        let delta = 0.5 * (alpha - gamma) / denom;
        (tau as f64 + delta, beta - 0.25 * (alpha - gamma) * delta)
    } else {
        (tau as f64, beta)
    };

    Some(PitchEstimate {
        frequency: sr / tau_refined,
        clarity: peak.clamp(0.0, 1.0),
    })
}

/// NSDF for lags `0..max_lag`: `2 * r(tau) / m(tau)`.
fn normalized_square_difference(window: &[f32], max_lag: usize) -> Vec<f64> {
    let x: Vec<f64> = window.iter().map(|&s| s as f64).collect();
    let n = x.len();
    (0..max_lag)
        .map(|tau| {
            let mut acf = 0.0;
            let mut energy = 0.0;
            for j in 0..n - tau {
                acf += x[j] * x[j + tau];
                energy += x[j] * x[j] + x[j + tau] * x[j + tau];
            }
            if energy > 0.0 { 2.0 * acf / energy } else { 0.0 }
        })
        .collect()
}

/// Highest point of each positive NSDF lobe after the zero-lag lobe.
/// A maximum sitting on the last lag is not a peak and is skipped.
fn key_maxima(nsdf: &[f64]) -> Vec<usize> {
    let len = nsdf.len();
    let mut peaks = Vec::new();
    let mut pos = 0;

    while pos < len && nsdf[pos] > 0.0 {
        pos += 1;
    }

    while pos < len {
        while pos < len && nsdf[pos] <= 0.0 {
            pos += 1;
        }
        let mut best = pos;
        while pos < len && nsdf[pos] > 0.0 {
            if nsdf[pos] > nsdf[best] {
                best = pos;
            }
            pos += 1;
        }
        if best > 0 && best + 1 < len && best < pos {
            peaks.push(best);
        }
    }
    peaks
}
