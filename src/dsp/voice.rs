//! Drone voice: one sustained pitch built from a timbre's partials and an
//! envelope.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PracticeError;

use super::envelope::{Envelope, EnvelopeShape};
use super::oscillator::{Oscillator, Waveform};

/// Glide time used when a sounding voice is retuned in place.
pub const RETUNE_GLIDE_SECONDS: f64 = 0.12;

/// The closed set of drone timbres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timbre {
    /// Plain sine.
    #[default]
    Pure,
    /// Triangle with a sine an octave below.
    Soft,
    /// Two slightly detuned sawtooths.
    Reed,
    /// Square wave, clarinet-like.
    Hollow,
}

impl FromStr for Timbre {
    type Err = PracticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pure" => Ok(Timbre::Pure),
            "soft" => Ok(Timbre::Soft),
            "reed" => Ok(Timbre::Reed),
            "hollow" => Ok(Timbre::Hollow),
            other => Err(PracticeError::InvalidArgument(format!(
                "unknown timbre '{other}'"
            ))),
        }
    }
}

/// One oscillator layer of a timbre.
#[derive(Debug, Clone, Copy)]
struct Partial {
    waveform: Waveform,
    /// Frequency multiplier relative to the voice pitch.
    ratio: f64,
    detune_cents: f64,
    gain: f64,
}

impl Partial {
    const fn new(waveform: Waveform, ratio: f64, detune_cents: f64, gain: f64) -> Self {
        Partial {
            waveform,
            ratio,
            detune_cents,
            gain,
        }
    }
}

impl Timbre {
    fn partials(self) -> &'static [Partial] {
        const PURE: [Partial; 1] = [Partial::new(Waveform::Sine, 1.0, 0.0, 0.8)];
        const SOFT: [Partial; 2] = [
            Partial::new(Waveform::Triangle, 1.0, 0.0, 0.6),
            Partial::new(Waveform::Sine, 0.5, 0.0, 0.25),
        ];
        const REED: [Partial; 2] = [
            Partial::new(Waveform::Sawtooth, 1.0, -3.0, 0.3),
            Partial::new(Waveform::Sawtooth, 1.0, 3.0, 0.3),
        ];
        const HOLLOW: [Partial; 1] = [Partial::new(Waveform::Square, 1.0, 0.0, 0.35)];
        match self {
            Timbre::Pure => &PURE,
            Timbre::Soft => &SOFT,
            Timbre::Reed => &REED,
            Timbre::Hollow => &HOLLOW,
        }
    }

    fn envelope(self) -> EnvelopeShape {
        match self {
            Timbre::Pure => EnvelopeShape::new(0.08, 0.0, 1.0, 0.25),
            Timbre::Soft => EnvelopeShape::new(0.25, 0.0, 1.0, 0.5),
            Timbre::Reed => EnvelopeShape::new(0.05, 0.2, 0.85, 0.2),
            Timbre::Hollow => EnvelopeShape::new(0.06, 0.1, 0.9, 0.2),
        }
    }
}

/// A single drone voice: the timbre's oscillators shaped by one envelope.
#[derive(Debug, Clone)]
pub struct DroneVoice {
    timbre: Timbre,
    layers: Vec<(Oscillator, f64, f64)>, // (oscillator, ratio, gain)
    envelope: Envelope,
    frequency: f64,
}

impl DroneVoice {
    /// Build a voice for `timbre`. The voice is silent until `note_on`.
    pub fn from_timbre(timbre: Timbre, sample_rate: f64) -> Self {
        let layers = timbre
            .partials()
            .iter()
            .map(|p| {
                let mut osc = Oscillator::new(p.waveform, sample_rate);
                osc.detune = p.detune_cents;
                (osc, p.ratio, p.gain)
            })
            .collect();
        DroneVoice {
            timbre,
            layers,
            envelope: Envelope::new(timbre.envelope(), sample_rate),
            frequency: 0.0,
        }
    }

    pub fn timbre(&self) -> Timbre {
        self.timbre
    }

    /// Target pitch in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Start sounding at `frequency`.
    pub fn note_on(&mut self, frequency: f64) {
        self.frequency = frequency;
        for (osc, ratio, _) in &mut self.layers {
            osc.set_frequency(frequency * *ratio);
            osc.reset();
        }
        self.envelope.gate_on();
    }

    /// Bend to `frequency` without retriggering the envelope.
    pub fn glide_to(&mut self, frequency: f64) {
        self.frequency = frequency;
        for (osc, ratio, _) in &mut self.layers {
            osc.glide_to(frequency * *ratio, RETUNE_GLIDE_SECONDS);
        }
    }

    /// Release the note.
    pub fn note_off(&mut self) {
        self.envelope.gate_off();
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        let mut sum = 0.0;
        for (osc, _, gain) in &mut self.layers {
            sum += osc.next_sample() * *gain;
        }
        sum * self.envelope.next_sample()
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }

    /// Is this voice done (envelope finished)?
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }
}
