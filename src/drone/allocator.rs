//! Drone voice allocation: which notes sound, in which slot, at what pitch.

use serde::Serialize;

use crate::error::{PracticeError, PracticeResult};
use crate::theory::{
    DEFAULT_REFERENCE_HZ, INTERVAL_LABELS, NotePitch, TuningMode, cents_between, interval_class,
    just_frequency, note_to_frequency,
};

pub const MAX_VOICES: usize = 3;
pub const MIN_OCTAVE: i32 = 2;
pub const MAX_OCTAVE: i32 = 6;
pub const DEFAULT_OCTAVE: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OctaveShift {
    Up,
    Down,
}

/// A sounding drone voice with its computed pitch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub slot_index: usize,
    /// Identity that survives the voice changing slot or octave.
    pub voice_id: u64,
    pub note: NotePitch,
    pub target_frequency_hz: f64,
    pub is_root: bool,
}

/// What the presentation layer shows for one voice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceDisplay {
    pub slot: usize,
    pub note: &'static str,
    pub octave: i32,
    pub frequency_hz: f64,
    pub is_root: bool,
    pub interval_label: &'static str,
    /// Offset from the equal-tempered pitch of the same note.
    pub cents: f64,
}

/// Ordered drone voices (slot 0 is the root) plus tuning settings.
///
/// Invariants: no two voices share a pitch class *and* octave, and there
/// are never more voices than `max_voices`.
#[derive(Debug, Clone, PartialEq)]
pub struct DroneSession {
    voices: Vec<NotePitch>,
    /// Stable id of each entry in `voices`.
    ids: Vec<u64>,
    next_id: u64,
    max_voices: usize,
    /// Octave used when a note lands in each slot.
    slot_octaves: Vec<i32>,
    tuning_mode: TuningMode,
    reference_hz: f64,
}

impl Default for DroneSession {
    fn default() -> Self {
        DroneSession {
            voices: Vec::new(),
            ids: Vec::new(),
            next_id: 0,
            max_voices: 2,
            slot_octaves: vec![DEFAULT_OCTAVE; 2],
            tuning_mode: TuningMode::EqualTempered,
            reference_hz: DEFAULT_REFERENCE_HZ,
        }
    }
}

impl DroneSession {
    pub fn new(max_voices: usize) -> PracticeResult<Self> {
        let mut session = DroneSession::default();
        session.set_max_voices(max_voices)?;
        Ok(session)
    }

    pub fn notes(&self) -> &[NotePitch] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    pub fn tuning_mode(&self) -> TuningMode {
        self.tuning_mode
    }

    pub fn set_tuning_mode(&mut self, mode: TuningMode) {
        self.tuning_mode = mode;
    }

    pub fn reference_hz(&self) -> f64 {
        self.reference_hz
    }

    pub fn set_reference_pitch(&mut self, hz: f64) -> PracticeResult<()> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(PracticeError::InvalidArgument(format!(
                "reference pitch must be positive, got {hz}"
            )));
        }
        self.reference_hz = hz;
        Ok(())
    }

    /// Default octave for `slot`.
    pub fn slot_octave(&self, slot: usize) -> i32 {
        self.slot_octaves.get(slot).copied().unwrap_or(DEFAULT_OCTAVE)
    }

    /// Change how many voices may sound at once.
    ///
    /// Shrinking keeps the most recently added voices: the oldest are
    /// dropped first, so the root may change.
    pub fn set_max_voices(&mut self, n: usize) -> PracticeResult<()> {
        if !(1..=MAX_VOICES).contains(&n) {
            return Err(PracticeError::InvalidArgument(format!(
                "voice count must be 1-{MAX_VOICES}, got {n}"
            )));
        }
        if self.voices.len() > n {
            let excess = self.voices.len() - n;
            self.voices.drain(..excess);
            self.ids.drain(..excess);
        }
        if self.slot_octaves.len() < n {
            self.slot_octaves.resize(n, DEFAULT_OCTAVE);
        }
        self.max_voices = n;
        Ok(())
    }

    /// Toggle a pitch class on or off.
    ///
    /// Turning a class off removes every voice of that class, whatever its
    /// octave. Turning one on when the session is full replaces the oldest
    /// voice.
    pub fn toggle_note(&mut self, pitch_class: u8) -> PracticeResult<()> {
        check_pitch_class(pitch_class)?;

        if self.voices.iter().any(|v| v.pitch_class == pitch_class) {
            while let Some(i) = self.voices.iter().position(|v| v.pitch_class == pitch_class) {
                self.remove_at(i);
            }
            return Ok(());
        }

        if self.max_voices == 1 && !self.voices.is_empty() {
            // Same voice, new pitch
            self.voices[0] = NotePitch::new(pitch_class, self.slot_octave(0));
            return Ok(());
        }
        if self.voices.len() >= self.max_voices {
            self.remove_at(0);
        }
        let slot = self.voices.len();
        self.push(NotePitch::new(pitch_class, self.slot_octave(slot)));
        Ok(())
    }

    /// Add a specific note. When full, the oldest non-root voice makes
    /// room; the root goes only if it is the sole voice.
    pub fn add_note(&mut self, note: NotePitch) -> PracticeResult<()> {
        check_pitch_class(note.pitch_class)?;
        check_octave(note.octave)?;
        if self.voices.contains(&note) {
            return Err(PracticeError::DuplicateVoiceRejected(note));
        }
        if self.voices.len() >= self.max_voices {
            let evict = if self.voices.len() > 1 { 1 } else { 0 };
            self.remove_at(evict);
        }
        self.push(note);
        Ok(())
    }

    /// Move the voice in `slot` to `octave`. For an empty slot this sets the
    /// octave its next note will use.
    pub fn set_octave(&mut self, slot: usize, octave: i32) -> PracticeResult<()> {
        self.check_slot(slot)?;
        check_octave(octave)?;
        self.move_slot(slot, octave)
    }

    /// Step the voice in `slot` one octave up or down. At the range limits
    /// the step reflects: up from the top octave goes down one instead, and
    /// down from the bottom goes up one.
    pub fn shift_octave(&mut self, slot: usize, shift: OctaveShift) -> PracticeResult<()> {
        self.check_slot(slot)?;
        let current = self
            .voices
            .get(slot)
            .map_or(self.slot_octave(slot), |v| v.octave);
        let target = match shift {
            OctaveShift::Up if current + 1 > MAX_OCTAVE => current - 1,
            OctaveShift::Up => current + 1,
            OctaveShift::Down if current - 1 < MIN_OCTAVE => current + 1,
            OctaveShift::Down => current - 1,
        };
        self.move_slot(slot, target)
    }

    fn move_slot(&mut self, slot: usize, octave: i32) -> PracticeResult<()> {
        if let Some(&note) = self.voices.get(slot) {
            let moved = note.with_octave(octave);
            let clash = self
                .voices
                .iter()
                .enumerate()
                .any(|(i, v)| i != slot && *v == moved);
            if clash {
                log::debug!("rejected octave move of {note}: {moved} already sounding");
                return Err(PracticeError::DuplicateVoiceRejected(moved));
            }
            self.voices[slot] = moved;
        }
        self.slot_octaves[slot] = octave;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.voices.clear();
        self.ids.clear();
    }

    fn push(&mut self, note: NotePitch) {
        self.voices.push(note);
        self.ids.push(self.next_id);
        self.next_id += 1;
    }

    fn remove_at(&mut self, index: usize) {
        self.voices.remove(index);
        self.ids.remove(index);
    }

    /// Frequency the voice in `slot` should sound at.
    ///
    /// The root is always equal-tempered. Other voices use just ratios above
    /// the root when just intonation is on.
    pub fn target_frequency(&self, slot: usize) -> Option<f64> {
        let note = *self.voices.get(slot)?;
        let equal = note_to_frequency(note, self.reference_hz);
        if slot == 0
            || self.tuning_mode != TuningMode::JustIntonation
            || !(2..=MAX_VOICES).contains(&self.voices.len())
        {
            return Some(equal);
        }
        let root = self.voices[0];
        let interval = interval_class(root, note);
        Some(just_frequency(
            note_to_frequency(root, self.reference_hz),
            interval.class_index,
            interval.octave_diff,
        ))
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.voices
            .iter()
            .enumerate()
            .filter_map(|(slot, &note)| {
                Some(Voice {
                    slot_index: slot,
                    voice_id: *self.ids.get(slot)?,
                    note,
                    target_frequency_hz: self.target_frequency(slot)?,
                    is_root: slot == 0,
                })
            })
            .collect()
    }

    pub fn display(&self) -> Vec<VoiceDisplay> {
        self.voices()
            .into_iter()
            .map(|v| {
                let label = match self.voices.first() {
                    Some(&root) if !v.is_root => interval_class(root, v.note).label(),
                    _ => INTERVAL_LABELS[0],
                };
                let equal = note_to_frequency(v.note, self.reference_hz);
                VoiceDisplay {
                    slot: v.slot_index,
                    note: v.note.name(),
                    octave: v.note.octave,
                    frequency_hz: v.target_frequency_hz,
                    is_root: v.is_root,
                    interval_label: label,
                    cents: cents_between(v.target_frequency_hz, equal),
                }
            })
            .collect()
    }

    fn check_slot(&self, slot: usize) -> PracticeResult<()> {
        if slot >= self.max_voices {
            return Err(PracticeError::InvalidArgument(format!(
                "slot {slot} out of range for {} voices",
                self.max_voices
            )));
        }
        Ok(())
    }
}

fn check_pitch_class(pitch_class: u8) -> PracticeResult<()> {
    if pitch_class >= 12 {
        return Err(PracticeError::InvalidArgument(format!(
            "pitch class must be 0-11, got {pitch_class}"
        )));
    }
    Ok(())
}

fn check_octave(octave: i32) -> PracticeResult<()> {
    if !(MIN_OCTAVE..=MAX_OCTAVE).contains(&octave) {
        return Err(PracticeError::InvalidArgument(format!(
            "octave must be {MIN_OCTAVE}-{MAX_OCTAVE}, got {octave}"
        )));
    }
    Ok(())
}
