//! Music theory: note/frequency/cents conversions and just intonation.
//!
//! Everything here is pure and stateless; the tuner, drone and click track
//! build on these functions.

pub mod interval;
pub mod note;

pub use interval::{
    INTERVAL_LABELS, Interval, JUST_RATIOS, TuningMode, interval_class, just_frequency, just_ratio,
};
pub use note::{
    A4_INDEX, DEFAULT_REFERENCE_HZ, NOTE_NAMES, NotePitch, NoteReading, cents_between,
    frequency_to_note, frequency_to_note_with_reference, note_to_frequency,
};
