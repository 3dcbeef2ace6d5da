//! Live drone control.
//!
//! `DroneEngine` wraps a [`DroneSession`] and keeps a synthesis backend in
//! step with it. Each voice keeps the backend slot it started in for as
//! long as it sounds. After every mutation the sounding voices are diffed
//! against the session by voice id: removed voices stop, new voices start
//! in the lowest free slot, and a voice whose target moved glides to it.
//! Voices that did not change receive nothing.

use serde::Serialize;

use crate::dsp::voice::Timbre;
use crate::error::{PracticeError, PracticeResult};
use crate::retry::RetryTimer;
use crate::session::{AudioSession, OutputLease, SessionState};
use crate::theory::{NotePitch, TuningMode};

use super::allocator::{DroneSession, OctaveShift, Voice, VoiceDisplay};

/// Frequencies closer than this are treated as unchanged.
const RETUNE_EPSILON_HZ: f64 = 1e-9;

/// Something that can sound drone voices, one per slot.
pub trait SynthBackend {
    /// Start (or restart) the voice in `slot`.
    fn start_voice(&mut self, slot: usize, frequency: f64, timbre: Timbre);
    /// Glide the sounding voice in `slot` to `frequency`.
    fn retune_voice(&mut self, slot: usize, frequency: f64);
    fn stop_voice(&mut self, slot: usize);
}

/// A recorded backend call, serializable for a JavaScript synth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SynthInstruction {
    Start {
        slot: usize,
        frequency: f64,
        timbre: Timbre,
    },
    Retune {
        slot: usize,
        frequency: f64,
    },
    Stop {
        slot: usize,
    },
}

/// Backend that queues instructions for the host to drain.
#[derive(Debug, Default)]
pub struct InstructionQueue {
    pending: Vec<SynthInstruction>,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything queued so far.
    pub fn take(&mut self) -> Vec<SynthInstruction> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[SynthInstruction] {
        &self.pending
    }
}

impl SynthBackend for InstructionQueue {
    fn start_voice(&mut self, slot: usize, frequency: f64, timbre: Timbre) {
        self.pending.push(SynthInstruction::Start {
            slot,
            frequency,
            timbre,
        });
    }

    fn retune_voice(&mut self, slot: usize, frequency: f64) {
        self.pending
            .push(SynthInstruction::Retune { slot, frequency });
    }

    fn stop_voice(&mut self, slot: usize) {
        self.pending.push(SynthInstruction::Stop { slot });
    }
}

/// A voice the backend is sounding.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sounding {
    voice_id: u64,
    /// Backend slot, fixed while the voice sounds.
    slot: usize,
    frequency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneState {
    Stopped,
    Playing,
    /// Output could not be acquired; a retry is pending.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DroneEvent {
    Started,
    Error(String),
}

pub struct DroneEngine<B> {
    session: DroneSession,
    backend: B,
    output: AudioSession,
    lease: Option<OutputLease>,
    timbre: Timbre,
    /// Set between `play` and `stop`; a retry only fires while set.
    wants_play: bool,
    retry: RetryTimer,
    sounding: Vec<Sounding>,
}

impl<B: SynthBackend> DroneEngine<B> {
    pub fn new(session: DroneSession, backend: B, output: AudioSession) -> Self {
        DroneEngine {
            session,
            backend,
            output,
            lease: None,
            timbre: Timbre::default(),
            wants_play: false,
            retry: RetryTimer::default(),
            sounding: Vec::new(),
        }
    }

    pub fn session(&self) -> &DroneSession {
        &self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn timbre(&self) -> Timbre {
        self.timbre
    }

    pub fn is_playing(&self) -> bool {
        self.lease.is_some()
    }

    pub fn state(&self) -> DroneState {
        if self.lease.is_some() {
            DroneState::Playing
        } else if self.wants_play {
            DroneState::Error
        } else {
            DroneState::Stopped
        }
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.session.voices()
    }

    pub fn display(&self) -> Vec<VoiceDisplay> {
        self.session.display()
    }

    /// Start sounding the current voices.
    ///
    /// If output cannot be acquired the engine stays silent and retries once
    /// after the retry delay.
    pub fn play(&mut self, now: f64) -> PracticeResult<()> {
        self.wants_play = true;
        if self.lease.is_some() {
            return Ok(());
        }
        self.retry.cancel();
        self.acquire(now)
    }

    /// Silence every voice and release output. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.wants_play = false;
        self.retry.cancel();
        self.silence();
        if self.lease.take().is_some() {
            log::info!("drone stopped");
        }
    }

    /// Notice output lost after a pending resume failed, and fire a due
    /// retry.
    pub fn tick(&mut self, now: f64) -> Option<DroneEvent> {
        if self.lease.is_some() {
            if let SessionState::Failed(reason) = self.output.state() {
                log::warn!("drone output lost: {reason}");
                self.silence();
                self.lease = None;
                self.retry.schedule(now);
                return Some(DroneEvent::Error(
                    PracticeError::AcquisitionFailed(reason).to_string(),
                ));
            }
            return None;
        }
        if !self.retry.poll(now) || !self.wants_play {
            return None;
        }
        log::warn!("retrying drone output");
        match self.acquire(now) {
            Ok(()) => Some(DroneEvent::Started),
            Err(e) => Some(DroneEvent::Error(e.to_string())),
        }
    }

    fn acquire(&mut self, now: f64) -> PracticeResult<()> {
        match self.output.acquire() {
            Ok(lease) => {
                self.lease = Some(lease);
                log::info!("drone playing {} voice(s)", self.session.len());
                self.sync();
                Ok(())
            }
            Err(e) => {
                log::warn!("drone output failed: {e}");
                self.retry.schedule(now);
                Err(e)
            }
        }
    }

    pub fn toggle_note(&mut self, pitch_class: u8) -> PracticeResult<()> {
        let result = self.session.toggle_note(pitch_class);
        self.sync();
        result
    }

    pub fn add_note(&mut self, note: NotePitch) -> PracticeResult<()> {
        let result = self.session.add_note(note);
        self.sync();
        result
    }

    pub fn set_octave(&mut self, slot: usize, octave: i32) -> PracticeResult<()> {
        let result = self.session.set_octave(slot, octave);
        self.sync();
        result
    }

    pub fn shift_octave(&mut self, slot: usize, shift: OctaveShift) -> PracticeResult<()> {
        let result = self.session.shift_octave(slot, shift);
        self.sync();
        result
    }

    pub fn set_max_voices(&mut self, n: usize) -> PracticeResult<()> {
        let result = self.session.set_max_voices(n);
        self.sync();
        result
    }

    pub fn set_tuning_mode(&mut self, mode: TuningMode) {
        self.session.set_tuning_mode(mode);
        self.sync();
    }

    pub fn set_reference_pitch(&mut self, hz: f64) -> PracticeResult<()> {
        let result = self.session.set_reference_pitch(hz);
        self.sync();
        result
    }

    pub fn clear(&mut self) {
        self.session.clear();
        self.sync();
    }

    /// Change timbre. Sounding voices are rebuilt and retriggered at their
    /// current targets.
    pub fn set_timbre(&mut self, timbre: Timbre) {
        if timbre == self.timbre {
            return;
        }
        self.timbre = timbre;
        for voice in &self.sounding {
            self.backend.start_voice(voice.slot, voice.frequency, timbre);
        }
    }

    fn silence(&mut self) {
        for voice in self.sounding.drain(..) {
            self.backend.stop_voice(voice.slot);
        }
    }

    fn free_slot(&self) -> usize {
        (0..self.sounding.len())
            .find(|&slot| self.sounding.iter().all(|v| v.slot != slot))
            .unwrap_or(self.sounding.len())
    }

    /// Bring the backend in line with the session's current targets.
    fn sync(&mut self) {
        if self.lease.is_none() {
            return;
        }
        let targets = self.session.voices();

        let backend = &mut self.backend;
        self.sounding.retain(|sounding| {
            let kept = targets.iter().any(|v| v.voice_id == sounding.voice_id);
            if !kept {
                backend.stop_voice(sounding.slot);
            }
            kept
        });

        for voice in &targets {
            let target = voice.target_frequency_hz;
            match self.sounding.iter().position(|s| s.voice_id == voice.voice_id) {
                Some(i) => {
                    let sounding = &mut self.sounding[i];
                    if (sounding.frequency - target).abs() > RETUNE_EPSILON_HZ {
                        log::debug!(
                            "retune slot {}: {:.2} -> {target:.2} Hz",
                            sounding.slot,
                            sounding.frequency
                        );
                        self.backend.retune_voice(sounding.slot, target);
                        sounding.frequency = target;
                    }
                }
                None => {
                    let slot = self.free_slot();
                    self.backend.start_voice(slot, target, self.timbre);
                    self.sounding.push(Sounding {
                        voice_id: voice.voice_id,
                        slot,
                        frequency: target,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::CountingDevice;
    use crate::session::{HostOutput, ResumeOutcome};

    const C: u8 = 0;
    const E: u8 = 4;
    const G: u8 = 7;

    fn engine(max: usize) -> DroneEngine<InstructionQueue> {
        DroneEngine::new(
            DroneSession::new(max).unwrap(),
            InstructionQueue::new(),
            AudioSession::new(HostOutput),
        )
    }

    fn slots(instructions: &[SynthInstruction]) -> Vec<(&'static str, usize)> {
        instructions
            .iter()
            .map(|i| match *i {
                SynthInstruction::Start { slot, .. } => ("start", slot),
                SynthInstruction::Retune { slot, .. } => ("retune", slot),
                SynthInstruction::Stop { slot } => ("stop", slot),
            })
            .collect()
    }

    #[test]
    fn silent_until_played() {
        let mut e = engine(3);
        e.toggle_note(C).unwrap();
        e.toggle_note(E).unwrap();
        assert!(e.backend().pending().is_empty());

        e.play(0.0).unwrap();
        assert!(e.is_playing());
        assert_eq!(slots(&e.backend_mut().take()), vec![("start", 0), ("start", 1)]);
    }

    #[test]
    fn adding_a_just_voice_leaves_others_alone() {
        let mut e = engine(3);
        e.set_tuning_mode(TuningMode::JustIntonation);
        e.toggle_note(C).unwrap();
        e.toggle_note(E).unwrap();
        e.play(0.0).unwrap();
        e.backend_mut().take();

        e.toggle_note(G).unwrap();
        let out = e.backend_mut().take();
        assert_eq!(out.len(), 1);
        match out[0] {
            SynthInstruction::Start { slot, frequency, .. } => {
                assert_eq!(slot, 2);
                assert!((frequency - 392.44).abs() < 0.01, "got {frequency}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn switching_tuning_mode_glides_non_root_voices() {
        let mut e = engine(2);
        e.toggle_note(C).unwrap();
        e.toggle_note(E).unwrap();
        e.play(0.0).unwrap();
        e.backend_mut().take();

        e.set_tuning_mode(TuningMode::JustIntonation);
        let out = e.backend_mut().take();
        assert_eq!(slots(&out), vec![("retune", 1)]);
    }

    #[test]
    fn removing_the_root_leaves_other_voices_alone() {
        let mut e = engine(3);
        for pc in [C, E, G] {
            e.toggle_note(pc).unwrap();
        }
        e.play(0.0).unwrap();
        e.backend_mut().take();

        e.toggle_note(C).unwrap();
        assert_eq!(slots(&e.backend_mut().take()), vec![("stop", 0)]);

        // The freed slot is reused
        e.toggle_note(C).unwrap();
        assert_eq!(slots(&e.backend_mut().take()), vec![("start", 0)]);
        e.set_timbre(Timbre::Hollow);
        assert_eq!(
            slots(&e.backend_mut().take()),
            vec![("start", 1), ("start", 2), ("start", 0)]
        );
    }

    #[test]
    fn octave_move_glides_in_place() {
        let mut e = engine(2);
        e.toggle_note(C).unwrap();
        e.toggle_note(G).unwrap();
        e.play(0.0).unwrap();
        e.backend_mut().take();

        e.set_octave(1, 3).unwrap();
        let out = e.backend_mut().take();
        assert_eq!(out.len(), 1);
        match out[0] {
            SynthInstruction::Retune { slot, frequency } => {
                assert_eq!(slot, 1);
                assert!((frequency - 196.0).abs() < 0.01, "got {frequency}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejected_change_emits_nothing() {
        let mut e = engine(2);
        e.toggle_note(C).unwrap();
        e.add_note(NotePitch::new(C, 5)).unwrap();
        e.play(0.0).unwrap();
        e.backend_mut().take();

        assert!(matches!(
            e.set_octave(1, 4),
            Err(PracticeError::DuplicateVoiceRejected(_))
        ));
        assert!(e.backend().pending().is_empty());
    }

    #[test]
    fn timbre_change_retriggers_sounding_voices() {
        let mut e = engine(2);
        e.toggle_note(C).unwrap();
        e.toggle_note(G).unwrap();
        e.play(0.0).unwrap();
        e.backend_mut().take();

        e.set_timbre(Timbre::Reed);
        let out = e.backend_mut().take();
        assert_eq!(slots(&out), vec![("start", 0), ("start", 1)]);
        assert!(out.iter().all(|i| matches!(
            i,
            SynthInstruction::Start { timbre: Timbre::Reed, .. }
        )));

        e.set_timbre(Timbre::Reed);
        assert!(e.backend().pending().is_empty());
    }

    #[test]
    fn stop_silences_and_releases_output() {
        let output = AudioSession::new(HostOutput);
        let mut e = DroneEngine::new(
            DroneSession::new(2).unwrap(),
            InstructionQueue::new(),
            output.clone(),
        );
        e.toggle_note(C).unwrap();
        e.play(0.0).unwrap();
        assert_eq!(output.leases(), 1);
        e.backend_mut().take();

        e.stop();
        e.stop();
        assert_eq!(slots(&e.backend_mut().take()), vec![("stop", 0)]);
        assert_eq!(output.leases(), 0);
        assert_eq!(output.state(), SessionState::Suspended);
        assert_eq!(e.state(), DroneState::Stopped);

        // Edits while stopped are silent
        e.toggle_note(G).unwrap();
        assert!(e.backend().pending().is_empty());
    }

    #[test]
    fn failed_output_retries_once() {
        let device = CountingDevice::new(Err("no output".into()));
        let resumes = device.resumes.clone();
        let mut e = DroneEngine::new(
            DroneSession::new(2).unwrap(),
            InstructionQueue::new(),
            AudioSession::new(device),
        );
        e.toggle_note(C).unwrap();

        assert!(matches!(e.play(0.0), Err(PracticeError::AcquisitionFailed(_))));
        assert_eq!(e.state(), DroneState::Error);
        assert_eq!(e.tick(1.0), None);
        assert!(matches!(e.tick(2.0), Some(DroneEvent::Error(_))));
        assert_eq!(resumes.load(std::sync::atomic::Ordering::SeqCst), 2);

        // Stopping cancels the follow-up retry
        e.stop();
        assert_eq!(e.tick(10.0), None);
        assert_eq!(resumes.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_pending_resume_moves_to_error() {
        let device = CountingDevice::new(Ok(ResumeOutcome::Pending));
        let resumes = device.resumes.clone();
        let output = AudioSession::new(device);
        let mut e = DroneEngine::new(
            DroneSession::new(2).unwrap(),
            InstructionQueue::new(),
            output.clone(),
        );
        e.toggle_note(C).unwrap();
        e.play(0.0).unwrap();
        e.backend_mut().take();
        assert_eq!(e.tick(0.5), None);

        output.resume_completed(Err("permission denied".into()));
        match e.tick(1.0) {
            Some(DroneEvent::Error(msg)) => assert!(msg.contains("permission denied"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(e.state(), DroneState::Error);
        assert_eq!(slots(&e.backend_mut().take()), vec![("stop", 0)]);
        assert_eq!(output.leases(), 0);

        // Reported once, retried once
        assert_eq!(e.tick(2.0), None);
        assert_eq!(resumes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(e.tick(3.0), Some(DroneEvent::Started));
        assert_eq!(resumes.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(e.state(), DroneState::Playing);
        assert_eq!(slots(&e.backend_mut().take()), vec![("start", 0)]);
    }

    #[test]
    fn pending_resume_still_starts_voices() {
        let output = AudioSession::new(CountingDevice::new(Ok(ResumeOutcome::Pending)));
        let mut e = DroneEngine::new(
            DroneSession::new(1).unwrap(),
            InstructionQueue::new(),
            output.clone(),
        );
        e.toggle_note(E).unwrap();
        e.play(0.0).unwrap();
        assert_eq!(output.state(), SessionState::Resuming);
        assert_eq!(slots(&e.backend_mut().take()), vec![("start", 0)]);
    }
}
