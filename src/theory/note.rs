//! Notes, frequencies and cents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PracticeError;

/// Default reference pitch for A4, in Hz.
pub const DEFAULT_REFERENCE_HZ: f64 = 440.0;

/// Linear pitch index of A4 (`octave * 12 + pitch_class`).
pub const A4_INDEX: i32 = 4 * 12 + 9;

/// Sharp-spelled names indexed by pitch class.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A discrete pitch: pitch class 0–11 (C = 0) plus octave (A4 = 440 Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePitch {
    pub pitch_class: u8,
    pub octave: i32,
}

impl NotePitch {
    /// Create a note. `pitch_class` is wrapped into 0–11.
    pub fn new(pitch_class: u8, octave: i32) -> Self {
        NotePitch {
            pitch_class: pitch_class % 12,
            octave,
        }
    }

    /// Build a note from a linear pitch index. Negative indices wrap the
    /// pitch class into 0–11 and floor the octave.
    pub fn from_index(index: i32) -> Self {
        NotePitch {
            pitch_class: index.rem_euclid(12) as u8,
            octave: index.div_euclid(12),
        }
    }

    /// Linear pitch index: `octave * 12 + pitch_class`.
    pub fn index(&self) -> i32 {
        self.octave * 12 + self.pitch_class as i32
    }

    /// Pitch-class name without octave, e.g. `"F#"`.
    pub fn name(&self) -> &'static str {
        NOTE_NAMES[self.pitch_class as usize]
    }

    /// Same pitch class in another octave.
    pub fn with_octave(&self, octave: i32) -> Self {
        NotePitch { octave, ..*self }
    }
}

impl fmt::Display for NotePitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.octave)
    }
}

impl FromStr for NotePitch {
    type Err = PracticeError;

    /// Parse a note name such as `"C4"`, `"F#3"` or `"Bb5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PracticeError::InvalidArgument(format!("not a note name: '{s}'"));
        let bytes = s.as_bytes();
        if bytes.is_empty() {
            return Err(invalid());
        }

        let mut semitone: i32 = match bytes[0] as char {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let mut idx = 1;
        if idx < bytes.len() {
            match bytes[idx] as char {
                '#' => {
                    semitone += 1;
                    idx += 1;
                }
                'b' => {
                    semitone -= 1;
                    idx += 1;
                }
                _ => {}
            }
        }

        let octave: i32 = s[idx..].parse().map_err(|_| invalid())?;
        Ok(NotePitch::from_index(octave * 12 + semitone))
    }
}

/// The nearest note to a frequency and how far off it is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteReading {
    pub note: NotePitch,
    /// Deviation from the nearest equal-tempered note, in (-50, 50] cents.
    pub cents_deviation: f64,
}

/// Equal-tempered frequency of `note` given the A4 reference pitch.
///
/// Formula: `reference_hz * 2^((index - A4_INDEX) / 12)`
pub fn note_to_frequency(note: NotePitch, reference_hz: f64) -> f64 {
    reference_hz * 2.0_f64.powf((note.index() - A4_INDEX) as f64 / 12.0)
}

/// Nearest note to `freq_hz` against A4 = 440 Hz.
pub fn frequency_to_note(freq_hz: f64) -> Option<NoteReading> {
    frequency_to_note_with_reference(freq_hz, DEFAULT_REFERENCE_HZ)
}

/// Nearest note to `freq_hz` against a custom A4 reference.
///
/// Returns `None` for non-positive or non-finite frequencies.
pub fn frequency_to_note_with_reference(freq_hz: f64, reference_hz: f64) -> Option<NoteReading> {
    if !(freq_hz.is_finite() && freq_hz > 0.0 && reference_hz > 0.0) {
        return None;
    }
    let semitones = 12.0 * (freq_hz / reference_hz).log2();
    let nearest = semitones.round();
    Some(NoteReading {
        note: NotePitch::from_index(nearest as i32 + A4_INDEX),
        cents_deviation: 100.0 * (semitones - nearest),
    })
}

/// Signed distance from `freq_b` to `freq_a` in cents.
pub fn cents_between(freq_a: f64, freq_b: f64) -> f64 {
    1200.0 * (freq_a / freq_b).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_reference() {
        let a4 = NotePitch::new(9, 4);
        assert_eq!(a4.index(), A4_INDEX);
        assert!((note_to_frequency(a4, 440.0) - 440.0).abs() < 1e-12);
        assert!((note_to_frequency(a4, 432.0) - 432.0).abs() < 1e-12);
    }

    #[test]
    fn middle_c() {
        let c4 = NotePitch::new(0, 4);
        let f = note_to_frequency(c4, 440.0);
        assert!((f - 261.6256).abs() < 0.001, "C4 should be ~261.63 Hz, got {f}");
    }

    #[test]
    fn round_trip_every_note() {
        for octave in 0..=8 {
            for pc in 0..12u8 {
                let note = NotePitch::new(pc, octave);
                let reading = frequency_to_note(note_to_frequency(note, 440.0)).unwrap();
                assert_eq!(reading.note, note);
                assert!(
                    reading.cents_deviation.abs() < 0.01,
                    "{note} drifted {} cents",
                    reading.cents_deviation
                );
            }
        }
    }

    #[test]
    fn a432_reads_flat() {
        let reading = frequency_to_note(432.0).unwrap();
        assert_eq!(reading.note, NotePitch::new(9, 4));
        assert!(
            (reading.cents_deviation - (-31.77)).abs() < 0.1,
            "Expected ~-31.8 cents, got {}",
            reading.cents_deviation
        );
    }

    #[test]
    fn pitch_class_never_negative() {
        // Far below C0: index < 0
        let reading = frequency_to_note(8.0).unwrap();
        assert!(reading.note.pitch_class < 12);
        assert!(reading.note.octave < 0);
        assert_eq!(NotePitch::from_index(-1), NotePitch::new(11, -1));
    }

    #[test]
    fn rejects_non_positive() {
        assert!(frequency_to_note(0.0).is_none());
        assert!(frequency_to_note(-10.0).is_none());
        assert!(frequency_to_note(f64::NAN).is_none());
    }

    #[test]
    fn cents_between_identity_and_octave() {
        for f in [27.5, 100.0, 440.0, 4186.0] {
            assert_eq!(cents_between(f, f), 0.0);
        }
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((cents_between(440.0, 880.0) + 1200.0).abs() < 1e-9);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("C4".parse::<NotePitch>().unwrap(), NotePitch::new(0, 4));
        assert_eq!("F#3".parse::<NotePitch>().unwrap(), NotePitch::new(6, 3));
        assert_eq!("Bb5".parse::<NotePitch>().unwrap(), NotePitch::new(10, 5));
        assert_eq!("Cb4".parse::<NotePitch>().unwrap(), NotePitch::new(11, 3));
        assert!("H2".parse::<NotePitch>().is_err());
        assert!("C".parse::<NotePitch>().is_err());
        assert_eq!(NotePitch::new(1, 2).to_string(), "C#2");
    }
}
