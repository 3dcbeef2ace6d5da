//! Intervals and 5-limit just intonation.

use serde::{Deserialize, Serialize};

use super::note::NotePitch;

/// How non-root drone voices are tuned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TuningMode {
    #[default]
    EqualTempered,
    JustIntonation,
}

/// 5-limit ratios as (numerator, denominator), indexed by interval class.
pub const JUST_RATIOS: [(u32, u32); 12] = [
    (1, 1),
    (16, 15),
    (9, 8),
    (6, 5),
    (5, 4),
    (4, 3),
    (45, 32),
    (3, 2),
    (8, 5),
    (5, 3),
    (16, 9),
    (15, 8),
];

/// Short interval names, indexed by interval class.
pub const INTERVAL_LABELS: [&str; 12] = [
    "Root", "m2", "M2", "m3", "M3", "P4", "TT", "P5", "m6", "M6", "m7", "M7",
];

/// An interval above a root, split into class and octave displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    /// Semitones above the root modulo the octave, 0–11.
    pub class_index: u8,
    /// Whole octaves between the notes; negative below the root.
    pub octave_diff: i32,
}

impl Interval {
    pub fn label(&self) -> &'static str {
        INTERVAL_LABELS[self.class_index as usize]
    }

    pub fn just_ratio(&self) -> f64 {
        just_ratio(self.class_index)
    }
}

/// Classify `other` relative to `root`.
pub fn interval_class(root: NotePitch, other: NotePitch) -> Interval {
    let diff = other.index() - root.index();
    Interval {
        class_index: diff.rem_euclid(12) as u8,
        octave_diff: diff.div_euclid(12),
    }
}

/// Just ratio for an interval class (wrapped into 0–11).
pub fn just_ratio(class_index: u8) -> f64 {
    let (num, den) = JUST_RATIOS[(class_index % 12) as usize];
    num as f64 / den as f64
}

/// Frequency `class_index` semitones (plus `octave_diff` octaves) above a
/// root, tuned with the just ratio.
pub fn just_frequency(root_hz: f64, class_index: u8, octave_diff: i32) -> f64 {
    root_hz * just_ratio(class_index) * 2.0_f64.powi(octave_diff)
}
