//! Drone generator: voice allocation and live voice control.

pub mod allocator;
pub mod engine;

pub use allocator::{
    DEFAULT_OCTAVE, DroneSession, MAX_OCTAVE, MAX_VOICES, MIN_OCTAVE, OctaveShift, Voice,
    VoiceDisplay,
};
pub use engine::{
    DroneEngine, DroneEvent, DroneState, InstructionQueue, SynthBackend, SynthInstruction,
};
