//! Practice settings.
//!
//! Hosts pass settings as camelCase JSON; every field is optional and
//! falls back to its default.

use serde::{Deserialize, Serialize};

use crate::click::{MAX_TEMPO_BPM, MIN_TEMPO_BPM, clamp_tempo};
use crate::drone::MAX_VOICES;
use crate::dsp::voice::Timbre;
use crate::error::{PracticeError, PracticeResult};
use crate::theory::{DEFAULT_REFERENCE_HZ, TuningMode};

pub const MIN_REFERENCE_HZ: f64 = 200.0;
pub const MAX_REFERENCE_HZ: f64 = 1000.0;
pub const MIN_WINDOW_SIZE: usize = 256;

/// Pitch detector tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TunerConfig {
    /// RMS below this is treated as silence.
    pub silence_gate: f64,
    pub clarity_threshold: f64,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    /// Samples per analysis window; a power of two.
    pub window_size: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        TunerConfig {
            silence_gate: 0.01,
            clarity_threshold: 0.8,
            min_frequency_hz: 50.0,
            max_frequency_hz: 2000.0,
            window_size: 2048,
        }
    }
}

impl TunerConfig {
    pub fn validate(&self) -> PracticeResult<()> {
        if !(self.silence_gate >= 0.0) {
            return Err(PracticeError::Config(format!(
                "silenceGate must be non-negative, got {}",
                self.silence_gate
            )));
        }
        if !(0.0..=1.0).contains(&self.clarity_threshold) {
            return Err(PracticeError::Config(format!(
                "clarityThreshold must be within 0-1, got {}",
                self.clarity_threshold
            )));
        }
        if !(self.min_frequency_hz > 0.0 && self.min_frequency_hz < self.max_frequency_hz) {
            return Err(PracticeError::Config(format!(
                "frequency range {}-{} Hz is empty",
                self.min_frequency_hz, self.max_frequency_hz
            )));
        }
        if self.window_size < MIN_WINDOW_SIZE || !self.window_size.is_power_of_two() {
            return Err(PracticeError::Config(format!(
                "windowSize must be a power of two >= {MIN_WINDOW_SIZE}, got {}",
                self.window_size
            )));
        }
        Ok(())
    }
}

/// Settings shared by the three tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PracticeConfig {
    pub reference_pitch_hz: f64,
    pub tempo_bpm: u32,
    pub max_voices: usize,
    pub tuning_mode: TuningMode,
    pub timbre: Timbre,
    pub sound_id: String,
    pub tuner: TunerConfig,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        PracticeConfig {
            reference_pitch_hz: DEFAULT_REFERENCE_HZ,
            tempo_bpm: 100,
            max_voices: 2,
            tuning_mode: TuningMode::EqualTempered,
            timbre: Timbre::Pure,
            sound_id: "click".to_string(),
            tuner: TunerConfig::default(),
        }
    }
}

impl PracticeConfig {
    /// Parse and validate settings. Tempo is clamped to
    /// `MIN_TEMPO_BPM..=MAX_TEMPO_BPM`; everything else out of range is an
    /// error.
    pub fn from_json(json: &str) -> PracticeResult<Self> {
        let mut config: PracticeConfig =
            serde_json::from_str(json).map_err(|e| PracticeError::Config(e.to_string()))?;
        if !(MIN_TEMPO_BPM..=MAX_TEMPO_BPM).contains(&config.tempo_bpm) {
            log::debug!("clamping tempo {} bpm", config.tempo_bpm);
            config.tempo_bpm = clamp_tempo(config.tempo_bpm);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> PracticeResult<String> {
        serde_json::to_string(self).map_err(|e| PracticeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> PracticeResult<()> {
        if !(MIN_REFERENCE_HZ..=MAX_REFERENCE_HZ).contains(&self.reference_pitch_hz) {
            return Err(PracticeError::Config(format!(
                "referencePitchHz must be within {MIN_REFERENCE_HZ}-{MAX_REFERENCE_HZ}, got {}",
                self.reference_pitch_hz
            )));
        }
        if !(1..=MAX_VOICES).contains(&self.max_voices) {
            return Err(PracticeError::Config(format!(
                "maxVoices must be 1-{MAX_VOICES}, got {}",
                self.max_voices
            )));
        }
        if self.sound_id.is_empty() {
            return Err(PracticeError::Config("soundId must not be empty".into()));
        }
        self.tuner.validate()
    }
}
