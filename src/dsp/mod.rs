//! DSP: pure Rust synthesis, sample playback and pitch estimation.
//!
//! The same code backs the WebAudio build (via AudioWorklet + WASM) and
//! native hosts: [`synth::DspSynth`] renders drone voices and
//! [`sampler::ClickPlayer`] renders the click track.

pub mod envelope;
pub mod mixer;
pub mod oscillator;
pub mod renderer;
pub mod sampler;
pub mod synth;
pub mod tuner;
pub mod voice;
