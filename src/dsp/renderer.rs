//! Offline rendering of the drone and click track to mono samples.
//!
//! Runs the same state machines a live host drives, ticking them once per
//! render block against the built-in backends.

use crate::click::{ClickTrack, SamplePlayback, SoundLibrary, SynthCatalog};
use crate::config::PracticeConfig;
use crate::drone::{DroneEngine, DroneSession};
use crate::error::PracticeResult;
use crate::session::{AudioSession, HostOutput};

use super::sampler::ClickPlayer;
use super::synth::DspSynth;

/// Frames rendered between ticks.
pub const BLOCK_SIZE: usize = 128;

/// Render `seconds` of a drone holding `pitch_classes` (added in order, so
/// the first is the root) with the voice settings from `config`.
pub fn render_drone(
    config: &PracticeConfig,
    pitch_classes: &[u8],
    seconds: f64,
    sample_rate: u32,
) -> PracticeResult<Vec<f32>> {
    let mut session = DroneSession::new(config.max_voices)?;
    session.set_reference_pitch(config.reference_pitch_hz)?;
    session.set_tuning_mode(config.tuning_mode);
    for &pc in pitch_classes {
        session.toggle_note(pc)?;
    }

    let synth = DspSynth::new(sample_rate as f64);
    let mut engine = DroneEngine::new(session, synth, AudioSession::new(HostOutput));
    engine.set_timbre(config.timbre);
    engine.play(0.0)?;

    let mut out = vec![0.0f32; frames(seconds, sample_rate)];
    for block in out.chunks_mut(BLOCK_SIZE) {
        engine.backend_mut().render(block);
    }
    engine.stop();
    Ok(out)
}

/// Render `seconds` of click track at the configured tempo and sound.
pub fn render_click(
    config: &PracticeConfig,
    seconds: f64,
    sample_rate: u32,
) -> PracticeResult<Vec<f32>> {
    let mut library = SoundLibrary::new(SynthCatalog::new(sample_rate));
    library.prewarm(&[config.sound_id.as_str()]);
    let player = ClickPlayer::new(sample_rate as f64);
    let mut track = ClickTrack::new(player, library, AudioSession::new(HostOutput));
    track.start(config.tempo_bpm, &config.sound_id, 0.0)?;

    let mut out = vec![0.0f32; frames(seconds, sample_rate)];
    for block in out.chunks_mut(BLOCK_SIZE) {
        let now = track.playback().current_time();
        track.tick(now);
        track.playback_mut().render(block);
    }
    track.shutdown();
    Ok(out)
}

fn frames(seconds: f64, sample_rate: u32) -> usize {
    (seconds.max(0.0) * sample_rate as f64).round() as usize
}
