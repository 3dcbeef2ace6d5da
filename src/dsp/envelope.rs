//! ADSR envelope generator.

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Attack/decay/release times in seconds plus the sustain level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f64,
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    pub release: f64,
}

impl EnvelopeShape {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        EnvelopeShape {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        EnvelopeShape::new(0.01, 0.1, 0.7, 0.3)
    }
}

/// ADSR envelope with linear segments. Retriggering starts the attack from
/// the current level so a rebuilt voice never clicks.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub shape: EnvelopeShape,
    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
}

impl Envelope {
    pub fn new(shape: EnvelopeShape, sample_rate: f64) -> Self {
        Envelope {
            shape,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        }
    }

    /// Trigger the envelope (note on).
    pub fn gate_on(&mut self) {
        self.enter(Stage::Attack, self.shape.attack);
    }

    /// Release the envelope (note off).
    pub fn gate_off(&mut self) {
        if self.stage == Stage::Idle {
            return;
        }
        self.enter(Stage::Release, self.shape.release);
    }

    /// Generate the next envelope sample [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Sustain => self.level = self.shape.sustain,
            Stage::Attack => {
                let t = self.progress();
                self.level = self.start_level + (1.0 - self.start_level) * t;
                if t >= 1.0 {
                    self.enter(Stage::Decay, self.shape.decay);
                }
            }
            Stage::Decay => {
                let t = self.progress();
                self.level = self.start_level - (self.start_level - self.shape.sustain) * t;
                if t >= 1.0 {
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Release => {
                let t = self.progress();
                self.level = self.start_level * (1.0 - t);
                if t >= 1.0 {
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Returns true once the release has finished (or before any gate).
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    /// Fraction of the current stage completed, advancing one sample.
    fn progress(&mut self) -> f64 {
        if self.stage_samples == 0 {
            return 1.0;
        }
        self.stage_counter += 1;
        (self.stage_counter as f64 / self.stage_samples as f64).min(1.0)
    }

    fn enter(&mut self, stage: Stage, seconds: f64) {
        self.stage = stage;
        self.stage_samples = (seconds * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = self.level;
    }
}
