//! Anti-aliased oscillators using PolyBLEP, with pitch glide.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
///
/// Frequency changes requested with [`Oscillator::glide_to`] move
/// exponentially (constant cents per sample) so a retuned drone voice
/// bends to its new pitch instead of jumping.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub detune: f64, // in cents
    frequency: f64,
    target: f64,
    /// Per-sample frequency multiplier while gliding.
    glide_ratio: f64,
    glide_remaining: usize,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            detune: 0.0,
            frequency: 440.0,
            target: 440.0,
            glide_ratio: 1.0,
            glide_remaining: 0,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Current (possibly mid-glide) frequency in Hz, before detune.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Frequency the oscillator is heading to.
    pub fn target_frequency(&self) -> f64 {
        self.target
    }

    /// Jump straight to `frequency`, cancelling any glide.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.target = frequency;
        self.glide_ratio = 1.0;
        self.glide_remaining = 0;
    }

    /// Slide to `frequency` over `seconds`.
    pub fn glide_to(&mut self, frequency: f64, seconds: f64) {
        let samples = (seconds * self.sample_rate) as usize;
        if samples == 0 || self.frequency <= 0.0 || frequency <= 0.0 {
            self.set_frequency(frequency);
            return;
        }
        self.target = frequency;
        self.glide_ratio = (frequency / self.frequency).powf(1.0 / samples as f64);
        self.glide_remaining = samples;
    }

    /// Effective frequency accounting for detune (in cents).
    fn effective_freq(&self) -> f64 {
        self.frequency * (2.0_f64).powf(self.detune / 1200.0)
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        self.effective_freq() / self.sample_rate
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0 - poly_blep(self.phase, inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        if self.glide_remaining > 0 {
            self.glide_remaining -= 1;
            self.frequency = if self.glide_remaining == 0 {
                self.target
            } else {
                self.frequency * self.glide_ratio
            };
        }

        sample
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_zero_at_start() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        osc.set_frequency(440.0);
        let sample = osc.next_sample();
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn waveforms_stay_in_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Triangle,
        ] {
            let mut osc = Oscillator::new(waveform, 44100.0);
            osc.set_frequency(440.0);
            for _ in 0..44100 {
                let s = osc.next_sample();
                assert!(s.abs() <= 1.5, "{waveform:?} out of range: {s}");
            }
        }
    }

    #[test]
    fn detune_shifts_frequency() {
        let mut osc1 = Oscillator::new(Waveform::Sine, 44100.0);
        osc1.set_frequency(440.0);

        let mut osc2 = Oscillator::new(Waveform::Sine, 44100.0);
        osc2.set_frequency(440.0);
        osc2.detune = 1200.0; // +1 octave

        assert!(
            (osc2.phase_inc() - 2.0 * osc1.phase_inc()).abs() < 1e-10,
            "1200 cents detune should double frequency"
        );
    }

    #[test]
    fn glide_lands_on_target() {
        let mut osc = Oscillator::new(Waveform::Sine, 1000.0);
        osc.set_frequency(200.0);
        osc.glide_to(400.0, 0.1); // 100 samples

        for _ in 0..50 {
            osc.next_sample();
        }
        let mid = osc.frequency();
        assert!(mid > 200.0 && mid < 400.0, "Mid-glide frequency was {mid}");
        // Exponential glide passes the geometric mean halfway through
        assert!((mid - 282.84).abs() < 1.0, "Expected ~282.8 Hz, got {mid}");

        for _ in 0..50 {
            osc.next_sample();
        }
        assert_eq!(osc.frequency(), 400.0);
        assert_eq!(osc.target_frequency(), 400.0);
    }

    #[test]
    fn zero_length_glide_jumps() {
        let mut osc = Oscillator::new(Waveform::Triangle, 44100.0);
        osc.set_frequency(100.0);
        osc.glide_to(150.0, 0.0);
        assert_eq!(osc.frequency(), 150.0);
    }
}
