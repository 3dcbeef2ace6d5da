pub mod click;
pub mod config;
pub mod detector;
pub mod drone;
pub mod dsp;
pub mod error;
pub mod retry;
pub mod session;
pub mod theory;

#[cfg(feature = "catalog")]
pub mod catalog;
#[cfg(feature = "catalog")]
pub mod host;

use crate::click::{ClickEvent, ClickState, ClickTrack, PlaybackQueue, SoundLibrary, SynthCatalog};
use crate::config::{PracticeConfig, TunerConfig};
use crate::detector::{DetectorState, FedInput, PitchDetector, TunerEvent, analyse_window};
use crate::drone::{DroneEngine, DroneSession, InstructionQueue, OctaveShift};
use crate::dsp::voice::Timbre;
use crate::error::{PracticeError, PracticeResult};
use crate::session::{AudioSession, HostOutput};
use crate::theory::{NotePitch, TuningMode, note_to_frequency};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the practice-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: equal-tempered frequency of a note against an A4 reference.
#[wasm_bindgen]
pub fn note_frequency(pitch_class: u8, octave: i32, reference_hz: f64) -> f64 {
    note_to_frequency(NotePitch::new(pitch_class % 12, octave), reference_hz)
}

/// WASM-exposed: analyse one microphone window with the default tuner
/// settings. Returns `{ kind: "pitch", note, centsDeviation, frequencyHz,
/// clarity }` or `{ kind: "noPitch" }`.
#[wasm_bindgen]
pub fn analyse_tuner_window(samples: &[f32], sample_rate: u32) -> Result<JsValue, JsValue> {
    let reading = analyse_window(samples, sample_rate, &TunerConfig::default());
    serde_wasm_bindgen::to_value(&reading).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render a drone preview to mono f32 samples.
/// `config_json` is a settings object; `{}` uses the defaults.
#[wasm_bindgen]
pub fn render_drone_samples(
    config_json: &str,
    pitch_classes: &[u8],
    seconds: f64,
    sample_rate: u32,
) -> Result<Vec<f32>, JsValue> {
    let config = PracticeConfig::from_json(config_json).map_err(to_js)?;
    dsp::renderer::render_drone(&config, pitch_classes, seconds, sample_rate).map_err(to_js)
}

/// WASM-exposed: render the click track to mono f32 samples.
#[wasm_bindgen]
pub fn render_click_samples(
    config_json: &str,
    seconds: f64,
    sample_rate: u32,
) -> Result<Vec<f32>, JsValue> {
    let config = PracticeConfig::from_json(config_json).map_err(to_js)?;
    dsp::renderer::render_click(&config, seconds, sample_rate).map_err(to_js)
}

fn to_js(e: PracticeError) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// A rejected duplicate leaves the drone unchanged and is not an error for
/// the page.
fn quiet_duplicates(result: PracticeResult<()>) -> PracticeResult<()> {
    match result {
        Err(PracticeError::DuplicateVoiceRejected(note)) => {
            log::debug!("ignored duplicate voice {note}");
            Ok(())
        }
        other => other,
    }
}

/// WASM-exposed drone. Voice changes are queued as synth instructions for
/// the page's audio graph; drain them with `takeInstructions` after each
/// call.
#[wasm_bindgen]
pub struct DroneController {
    engine: DroneEngine<InstructionQueue>,
}

impl DroneController {
    fn with_session(session: DroneSession) -> Self {
        let output = AudioSession::new(HostOutput);
        DroneController {
            engine: DroneEngine::new(session, InstructionQueue::new(), output),
        }
    }

    fn configured(config: &PracticeConfig) -> PracticeResult<Self> {
        let mut session = DroneSession::new(config.max_voices)?;
        session.set_reference_pitch(config.reference_pitch_hz)?;
        session.set_tuning_mode(config.tuning_mode);
        let mut controller = Self::with_session(session);
        controller.engine.set_timbre(config.timbre);
        Ok(controller)
    }
}

#[wasm_bindgen]
impl DroneController {
    #[wasm_bindgen(constructor)]
    pub fn new(max_voices: usize) -> Result<DroneController, JsValue> {
        let session = DroneSession::new(max_voices).map_err(to_js)?;
        Ok(Self::with_session(session))
    }

    /// Build from a JSON settings object (see `PracticeConfig`).
    #[wasm_bindgen(js_name = fromConfig)]
    pub fn from_config(json: &str) -> Result<DroneController, JsValue> {
        let config = PracticeConfig::from_json(json).map_err(to_js)?;
        Self::configured(&config).map_err(to_js)
    }

    pub fn play(&mut self, now: f64) -> Result<(), JsValue> {
        self.engine.play(now).map_err(to_js)
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn tick(&mut self, now: f64) {
        if let Some(event) = self.engine.tick(now) {
            log::debug!("drone: {event:?}");
        }
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    #[wasm_bindgen(js_name = toggleNote)]
    pub fn toggle_note(&mut self, pitch_class: u8) -> Result<(), JsValue> {
        self.engine.toggle_note(pitch_class).map_err(to_js)
    }

    #[wasm_bindgen(js_name = setOctave)]
    pub fn set_octave(&mut self, slot: usize, octave: i32) -> Result<(), JsValue> {
        quiet_duplicates(self.engine.set_octave(slot, octave)).map_err(to_js)
    }

    #[wasm_bindgen(js_name = shiftOctave)]
    pub fn shift_octave(&mut self, slot: usize, up: bool) -> Result<(), JsValue> {
        let shift = if up { OctaveShift::Up } else { OctaveShift::Down };
        quiet_duplicates(self.engine.shift_octave(slot, shift)).map_err(to_js)
    }

    #[wasm_bindgen(js_name = setMaxVoices)]
    pub fn set_max_voices(&mut self, n: usize) -> Result<(), JsValue> {
        self.engine.set_max_voices(n).map_err(to_js)
    }

    #[wasm_bindgen(js_name = setJustIntonation)]
    pub fn set_just_intonation(&mut self, enabled: bool) {
        let mode = if enabled {
            TuningMode::JustIntonation
        } else {
            TuningMode::EqualTempered
        };
        self.engine.set_tuning_mode(mode);
    }

    #[wasm_bindgen(js_name = setReferencePitch)]
    pub fn set_reference_pitch(&mut self, hz: f64) -> Result<(), JsValue> {
        self.engine.set_reference_pitch(hz).map_err(to_js)
    }

    /// `pure`, `soft`, `reed` or `hollow`.
    #[wasm_bindgen(js_name = setTimbre)]
    pub fn set_timbre(&mut self, name: &str) -> Result<(), JsValue> {
        let timbre: Timbre = name.parse().map_err(to_js)?;
        self.engine.set_timbre(timbre);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.engine.clear();
    }

    /// Drain queued synth instructions as `[{ type: "start" | "retune" |
    /// "stop", slot, ... }]`.
    #[wasm_bindgen(js_name = takeInstructions)]
    pub fn take_instructions(&mut self) -> Result<JsValue, JsValue> {
        let instructions = self.engine.backend_mut().take();
        serde_wasm_bindgen::to_value(&instructions).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Per-voice display records.
    pub fn voices(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.display())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}

/// WASM-exposed click track. The page owns the audio clock: pass its
/// current time to every call, then play what `takeInstructions` returns
/// (`arm` a sample, `disarm` it, `trigger` it at an audio time).
#[wasm_bindgen]
pub struct ClickController {
    track: ClickTrack<PlaybackQueue>,
}

impl ClickController {
    fn configured(config: &PracticeConfig, sample_rate: u32) -> Self {
        let mut library = SoundLibrary::new(SynthCatalog::new(sample_rate));
        library.prewarm(&[config.sound_id.as_str()]);
        let output = AudioSession::new(HostOutput);
        let mut track = ClickTrack::new(PlaybackQueue::new(), library, output);
        track.set_tempo(config.tempo_bpm);
        ClickController { track }
    }

    fn advance(&mut self, now: f64) -> Vec<ClickEvent> {
        self.track.playback_mut().set_time(now);
        self.track.tick(now)
    }
}

#[wasm_bindgen]
impl ClickController {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32) -> ClickController {
        Self::configured(&PracticeConfig::default(), sample_rate)
    }

    /// Build from a JSON settings object; its sound is decoded up front.
    #[wasm_bindgen(js_name = fromConfig)]
    pub fn from_config(json: &str, sample_rate: u32) -> Result<ClickController, JsValue> {
        let config = PracticeConfig::from_json(json).map_err(to_js)?;
        Ok(Self::configured(&config, sample_rate))
    }

    pub fn start(&mut self, tempo_bpm: u32, sound_id: &str, now: f64) -> Result<(), JsValue> {
        self.track.playback_mut().set_time(now);
        self.track.start(tempo_bpm, sound_id, now).map_err(to_js)
    }

    #[wasm_bindgen(js_name = setTempo)]
    pub fn set_tempo(&mut self, bpm: u32) {
        self.track.set_tempo(bpm);
    }

    #[wasm_bindgen(js_name = switchSound)]
    pub fn switch_sound(&mut self, sound_id: &str, now: f64) -> Result<(), JsValue> {
        self.track.playback_mut().set_time(now);
        self.track.switch_sound(sound_id, now).map_err(to_js)
    }

    pub fn stop(&mut self) -> Result<(), JsValue> {
        self.track.stop().map_err(to_js)
    }

    /// Advance to `now`. Returns events as `[{ type, value }]`, e.g.
    /// `{ type: "beat", value: { index: 2 } }`.
    pub fn tick(&mut self, now: f64) -> Result<JsValue, JsValue> {
        let events = self.advance(now);
        serde_wasm_bindgen::to_value(&events).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// Drain queued playback instructions as `[{ type: "arm", samples,
    /// sampleRate } | { type: "disarm" } | { type: "trigger", at }]`.
    #[wasm_bindgen(js_name = takeInstructions)]
    pub fn take_instructions(&mut self) -> Result<JsValue, JsValue> {
        let instructions = self.track.playback_mut().take();
        serde_wasm_bindgen::to_value(&instructions).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    pub fn state(&self) -> String {
        click_state_name(self.track.state()).to_string()
    }

    pub fn tempo(&self) -> u32 {
        self.track.tempo()
    }

    #[wasm_bindgen(js_name = beatPhase)]
    pub fn beat_phase(&self) -> u32 {
        self.track.beat_phase()
    }

    #[wasm_bindgen(js_name = isLoading)]
    pub fn is_loading(&self) -> bool {
        self.track.is_loading()
    }

    /// Ids of the available sounds.
    pub fn sounds(&self) -> Vec<String> {
        self.track.library().ids()
    }
}

fn click_state_name(state: ClickState) -> &'static str {
    match state {
        ClickState::Stopped => "stopped",
        ClickState::Starting => "starting",
        ClickState::Running => "running",
        ClickState::SwitchingSound => "switchingSound",
        ClickState::Error => "error",
    }
}

/// WASM-exposed tuner. The page captures the microphone itself and feeds
/// it in with `pushSamples` while `isCapturing` is true; a refused
/// permission is reported with `denyInput`.
#[wasm_bindgen]
pub struct TunerController {
    detector: PitchDetector<FedInput>,
    input: FedInput,
}

impl TunerController {
    fn configured(config: TunerConfig, sample_rate: u32) -> Self {
        let input = FedInput::new(sample_rate, config.window_size);
        TunerController {
            detector: PitchDetector::new(input.clone(), config),
            input,
        }
    }
}

#[wasm_bindgen]
impl TunerController {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32) -> TunerController {
        Self::configured(TunerConfig::default(), sample_rate)
    }

    /// Build from a JSON settings object, using its `tuner` section.
    #[wasm_bindgen(js_name = fromConfig)]
    pub fn from_config(json: &str, sample_rate: u32) -> Result<TunerController, JsValue> {
        let config = PracticeConfig::from_json(json).map_err(to_js)?;
        Ok(Self::configured(config.tuner, sample_rate))
    }

    pub fn start(&mut self, now: f64) -> Result<(), JsValue> {
        self.detector.start(now).map_err(to_js)
    }

    pub fn stop(&mut self) {
        self.detector.stop();
    }

    #[wasm_bindgen(js_name = pushSamples)]
    pub fn push_samples(&self, samples: &[f32]) {
        self.input.push(samples);
    }

    #[wasm_bindgen(js_name = denyInput)]
    pub fn deny_input(&self, reason: &str) {
        self.input.deny(reason);
    }

    #[wasm_bindgen(js_name = allowInput)]
    pub fn allow_input(&self) {
        self.input.allow();
    }

    #[wasm_bindgen(js_name = isCapturing)]
    pub fn is_capturing(&self) -> bool {
        self.input.is_open()
    }

    /// Analyse the latest window if one is due. Returns `{ type: "reading",
    /// value: { reading, timestamp } }`, `{ type: "error", value }` or
    /// `undefined`.
    pub fn tick(&mut self, now: f64) -> Result<JsValue, JsValue> {
        let event: Option<TunerEvent> = self.detector.tick(now);
        serde_wasm_bindgen::to_value(&event).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    pub fn state(&self) -> String {
        match self.detector.state() {
            DetectorState::Idle => "idle",
            DetectorState::Listening => "listening",
            DetectorState::Error => "error",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::PlaybackInstruction;
    use crate::detector::TunerReading;
    use crate::drone::SynthInstruction;

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn note_frequency_middle_c() {
        assert!((note_frequency(0, 4, 440.0) - 261.63).abs() < 0.01);
        assert!((note_frequency(9, 4, 442.0) - 442.0).abs() < 1e-9);
    }

    #[test]
    fn duplicates_are_quiet() {
        let dup = Err(PracticeError::DuplicateVoiceRejected(NotePitch::new(0, 4)));
        assert_eq!(quiet_duplicates(dup), Ok(()));
        let bad = Err(PracticeError::InvalidArgument("slot".into()));
        assert!(quiet_duplicates(bad).is_err());
    }

    #[test]
    fn configured_controller_applies_settings() {
        let config = PracticeConfig::from_json(
            r#"{"maxVoices": 3, "tuningMode": "justIntonation", "timbre": "soft"}"#,
        )
        .unwrap();
        let mut controller = DroneController::configured(&config).unwrap();
        controller.engine.toggle_note(0).unwrap();
        controller.engine.toggle_note(7).unwrap();
        controller.engine.play(0.0).unwrap();

        let queued = controller.engine.backend_mut().take();
        assert_eq!(queued.len(), 2);
        match queued[1] {
            SynthInstruction::Start { frequency, timbre, .. } => {
                assert_eq!(timbre, Timbre::Soft);
                assert_eq!(frequency, note_frequency(0, 4, 440.0) * 1.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn instructions_serialize_with_type_tag() {
        let json = serde_json::to_value(SynthInstruction::Retune {
            slot: 1,
            frequency: 330.0,
        })
        .unwrap();
        assert_eq!(json["type"], "retune");
        assert_eq!(json["slot"], 1);
    }

    fn kinds(instructions: &[PlaybackInstruction]) -> Vec<&'static str> {
        instructions
            .iter()
            .map(|i| match i {
                PlaybackInstruction::Arm { .. } => "arm",
                PlaybackInstruction::Disarm => "disarm",
                PlaybackInstruction::Trigger { .. } => "trigger",
            })
            .collect()
    }

    #[test]
    fn click_controller_queues_playback_for_the_page() {
        let config = PracticeConfig::from_json(r#"{"tempoBpm": 120, "soundId": "wood"}"#).unwrap();
        let mut controller = ClickController::configured(&config, 8000);
        assert_eq!(controller.track.tempo(), 120);

        controller.track.start(120, "wood", 0.0).unwrap();
        assert_eq!(controller.advance(0.0), vec![ClickEvent::Started]);
        controller.advance(0.45);
        let queued = controller.track.playback_mut().take();
        assert_eq!(kinds(&queued), vec!["arm", "trigger", "trigger"]);
        assert_eq!(queued[2], PlaybackInstruction::Trigger { at: 0.5 });

        controller.track.playback_mut().set_time(0.47);
        controller.track.switch_sound("beep", 0.47).unwrap();
        assert_eq!(click_state_name(controller.track.state()), "switchingSound");
        controller.advance(0.48);
        let queued = controller.track.playback_mut().take();
        assert_eq!(kinds(&queued), vec!["disarm", "arm", "trigger"]);
        assert_eq!(queued[2], PlaybackInstruction::Trigger { at: 0.5 });

        controller.track.stop().unwrap();
        assert_eq!(kinds(&controller.track.playback_mut().take()), vec!["disarm"]);
        assert_eq!(click_state_name(controller.track.state()), "stopped");
    }

    #[test]
    fn tuner_controller_reads_pushed_audio() {
        let mut controller = TunerController::configured(TunerConfig::default(), 44100);
        assert!(!controller.is_capturing());

        controller.deny_input("permission denied");
        assert!(controller.detector.start(0.0).is_err());
        assert_eq!(controller.detector.state(), DetectorState::Error);

        controller.allow_input();
        controller.detector.tick(2.0);
        assert!(controller.is_capturing());
        let tone: Vec<f32> = (0..2048)
            .map(|i| (0.5 * (2.0 * std::f64::consts::PI * 440.0 * i as f64 / 44100.0).sin()) as f32)
            .collect();
        controller.push_samples(&tone);
        match controller.detector.tick(2.1) {
            Some(TunerEvent::Reading {
                reading: TunerReading::Pitch(p),
                ..
            }) => assert_eq!(p.note, NotePitch::new(9, 4)),
            other => panic!("unexpected {other:?}"),
        }

        controller.stop();
        assert!(!controller.is_capturing());
    }
}
