//! Click-track metronome.
//!
//! Beats are scheduled ahead on the playback backend's audio clock: each
//! [`ClickTrack::tick`] schedules every beat falling inside the lookahead
//! window. Beat `n` sits at `anchor + n * interval`, so the host's tick
//! jitter never moves a beat. A visual beat index follows each trigger a
//! fixed delay later.
//!
//! Sound switches tear the old binding down before the new sample is
//! armed; the backend never has two samples armed. Clicks already
//! sounding ring out.

pub mod library;
pub mod queue;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::dsp::sampler::SampleBuffer;
use crate::error::{PracticeError, PracticeResult};
use crate::retry::RetryTimer;
use crate::session::{AudioSession, OutputLease, SessionState};

pub use library::{AssetState, LoadStatus, SoundAsset, SoundCatalog, SoundLibrary, SynthCatalog};
pub use queue::{PlaybackInstruction, PlaybackQueue};

pub const MIN_TEMPO_BPM: u32 = 30;
pub const MAX_TEMPO_BPM: u32 = 300;
/// Delay between a beat sounding and its visual indicator.
pub const VISUAL_BEAT_DELAY: f64 = 0.03;
/// How far ahead of the audio clock beats are scheduled.
pub const SCHEDULE_LOOKAHEAD: f64 = 0.1;
pub const BEATS_PER_BAR: u32 = 4;

/// Plays one armed sample at scheduled audio-clock times.
pub trait SamplePlayback {
    /// The audio clock, in seconds.
    fn current_time(&self) -> f64;
    fn arm(&mut self, sound: Arc<SampleBuffer>);
    /// Drop the armed sample and any triggers not yet played.
    fn disarm(&mut self);
    fn trigger_at(&mut self, when: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickState {
    Stopped,
    Starting,
    Running,
    SwitchingSound,
    Error,
}

impl ClickState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClickState::Stopped => "stopped",
            ClickState::Starting => "starting",
            ClickState::Running => "running",
            ClickState::SwitchingSound => "switching sound",
            ClickState::Error => "in error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ClickEvent {
    /// A sound decode started (`true`) or finished (`false`).
    Loading(bool),
    /// Visual beat indicator, `0..BEATS_PER_BAR`.
    Beat { index: u32 },
    Error(String),
    Started,
    Stopped,
}

pub fn clamp_tempo(bpm: u32) -> u32 {
    bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM)
}

pub struct ClickTrack<P: SamplePlayback> {
    playback: P,
    library: SoundLibrary,
    output: AudioSession,
    lease: Option<OutputLease>,
    state: ClickState,
    tempo_bpm: u32,
    /// Sound that is (or is about to be) armed.
    sound_id: String,
    armed_id: Option<String>,
    loading: bool,
    /// Set between `start` and `stop`; a retry only fires while set.
    wants_run: bool,
    retry: RetryTimer,

    anchor: f64,
    beats_from_anchor: u64,
    last_scheduled: Option<f64>,
    next_index: u32,
    /// Scheduled beats not yet shown: (audio time, beat index).
    upcoming: VecDeque<(f64, u32)>,
    beat_phase: u32,
    events: Vec<ClickEvent>,
}

impl<P: SamplePlayback> ClickTrack<P> {
    pub fn new(playback: P, library: SoundLibrary, output: AudioSession) -> Self {
        ClickTrack {
            playback,
            library,
            output,
            lease: None,
            state: ClickState::Stopped,
            tempo_bpm: 100,
            sound_id: String::new(),
            armed_id: None,
            loading: false,
            wants_run: false,
            retry: RetryTimer::default(),
            anchor: 0.0,
            beats_from_anchor: 0,
            last_scheduled: None,
            next_index: 0,
            upcoming: VecDeque::new(),
            beat_phase: 0,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> ClickState {
        self.state
    }

    pub fn tempo(&self) -> u32 {
        self.tempo_bpm
    }

    /// Index of the last beat shown, `0..BEATS_PER_BAR`.
    pub fn beat_phase(&self) -> u32 {
        self.beat_phase
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn sound_id(&self) -> &str {
        &self.sound_id
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut P {
        &mut self.playback
    }

    pub fn library(&self) -> &SoundLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut SoundLibrary {
        &mut self.library
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    /// Seconds between beats at the current tempo.
    pub fn beat_interval(&self) -> f64 {
        60.0 / self.tempo_bpm as f64
    }

    /// Start clicking at `tempo_bpm` with `sound_id`.
    ///
    /// A sound that is not yet decoded leaves the track in `Starting` with
    /// the loading flag raised; `tick` finishes the start once it is ready.
    pub fn start(&mut self, tempo_bpm: u32, sound_id: &str, now: f64) -> PracticeResult<()> {
        match self.state {
            ClickState::SwitchingSound => return Err(PracticeError::SwitchInProgress),
            ClickState::Starting | ClickState::Running => {
                return Err(PracticeError::InvalidState {
                    op: "start",
                    state: self.state.as_str(),
                });
            }
            ClickState::Stopped | ClickState::Error => {}
        }
        self.tempo_bpm = clamp_tempo(tempo_bpm);
        self.sound_id = sound_id.to_string();
        self.wants_run = true;
        self.retry.cancel();
        self.next_index = 0;
        self.beat_phase = 0;
        self.begin(now)
    }

    /// Change tempo. While running the next unscheduled beat moves to the
    /// new spacing; the beat phase carries on.
    pub fn set_tempo(&mut self, bpm: u32) {
        let bpm = clamp_tempo(bpm);
        if bpm == self.tempo_bpm {
            return;
        }
        self.tempo_bpm = bpm;
        if self.state == ClickState::Running {
            if let Some(last) = self.last_scheduled {
                self.anchor = last;
                self.beats_from_anchor = 1;
            }
            log::debug!("click tempo {bpm} bpm");
        }
    }

    /// Swap the click sound while running.
    pub fn switch_sound(&mut self, sound_id: &str, now: f64) -> PracticeResult<()> {
        match self.state {
            ClickState::Running => {}
            ClickState::SwitchingSound => return Err(PracticeError::SwitchInProgress),
            other => {
                return Err(PracticeError::InvalidState {
                    op: "switch sound",
                    state: other.as_str(),
                });
            }
        }
        if self.armed_id.as_deref() == Some(sound_id) {
            return Ok(());
        }
        self.state = ClickState::SwitchingSound;
        self.rewind_unplayed();
        self.unbind();
        self.sound_id = sound_id.to_string();
        log::debug!("switching click sound to '{sound_id}'");
        self.load_and_bind(now)
    }

    /// Stop clicking and release output. Rejected while a sound switch is in
    /// flight; repeated calls are no-ops.
    pub fn stop(&mut self) -> PracticeResult<()> {
        if self.state == ClickState::SwitchingSound {
            return Err(PracticeError::SwitchInProgress);
        }
        self.shutdown();
        Ok(())
    }

    /// Stop from any state, including mid-switch.
    pub fn shutdown(&mut self) {
        self.wants_run = false;
        self.retry.cancel();
        self.unbind();
        self.upcoming.clear();
        self.last_scheduled = None;
        self.lease = None;
        self.loading = false;
        if self.state != ClickState::Stopped {
            log::info!("click track stopped");
            self.state = ClickState::Stopped;
            self.events.push(ClickEvent::Stopped);
        }
    }

    /// Advance the track: notice lost output, fire a due retry, finish
    /// pending loads, schedule beats inside the lookahead window and emit
    /// due visual beats.
    pub fn tick(&mut self, now: f64) -> Vec<ClickEvent> {
        if self.lease.is_some() {
            if let SessionState::Failed(reason) = self.output.state() {
                // Reported through events
                let _ = self.fail(PracticeError::AcquisitionFailed(reason), now);
            }
        }

        if self.retry.poll(now) && self.wants_run && self.state == ClickState::Error {
            log::warn!("retrying click track");
            // Failures are reported through events
            let _ = self.begin(now);
        }

        if matches!(self.state, ClickState::Starting | ClickState::SwitchingSound) {
            self.library.process_pending();
            match self.library.status(&self.sound_id) {
                LoadStatus::Ready(buffer) => self.bind(buffer),
                LoadStatus::Failed(e) => {
                    let _ = self.fail(e, now);
                }
                LoadStatus::Pending => {}
            }
        }

        if self.state == ClickState::Running {
            self.schedule();
            self.advance_visual();
        }
        std::mem::take(&mut self.events)
    }

    fn begin(&mut self, now: f64) -> PracticeResult<()> {
        if self.lease.is_none() {
            match self.output.acquire() {
                Ok(lease) => self.lease = Some(lease),
                Err(e) => return self.fail(e, now),
            }
        }
        self.state = ClickState::Starting;
        self.load_and_bind(now)
    }

    fn load_and_bind(&mut self, now: f64) -> PracticeResult<()> {
        match self.library.request(&self.sound_id) {
            LoadStatus::Ready(buffer) => {
                self.bind(buffer);
                Ok(())
            }
            LoadStatus::Pending => {
                self.set_loading(true);
                Ok(())
            }
            LoadStatus::Failed(e) => self.fail(e, now),
        }
    }

    fn bind(&mut self, buffer: Arc<SampleBuffer>) {
        self.set_loading(false);
        self.playback.arm(buffer);
        self.armed_id = Some(self.sound_id.clone());

        let clock = self.playback.current_time();
        if self.state == ClickState::Starting {
            self.anchor = clock;
            self.events.push(ClickEvent::Started);
            log::info!(
                "click track running at {} bpm with '{}'",
                self.tempo_bpm,
                self.sound_id
            );
        } else {
            // Resume on the old grid if its next beat is still ahead
            self.anchor = self.anchor.max(clock);
        }
        self.beats_from_anchor = 0;
        self.last_scheduled = None;
        self.state = ClickState::Running;
    }

    /// Disarm the backend and let go of the armed asset.
    fn unbind(&mut self) {
        self.playback.disarm();
        if let Some(id) = self.armed_id.take() {
            self.library.release(&id);
        }
    }

    /// Forget beats that were scheduled but have not sounded yet and point
    /// the grid at the first of them.
    fn rewind_unplayed(&mut self) {
        let clock = self.playback.current_time();
        let first_unplayed = self.upcoming.iter().position(|&(at, _)| at > clock);
        match first_unplayed {
            Some(i) => {
                let (at, index) = self.upcoming[i];
                self.upcoming.truncate(i);
                self.anchor = at;
                self.next_index = index;
            }
            None => {
                self.anchor = self.next_beat_time();
            }
        }
        self.beats_from_anchor = 0;
        self.last_scheduled = None;
    }

    fn next_beat_time(&self) -> f64 {
        self.anchor + self.beats_from_anchor as f64 * self.beat_interval()
    }

    fn schedule(&mut self) {
        let horizon = self.playback.current_time() + SCHEDULE_LOOKAHEAD;
        loop {
            let at = self.next_beat_time();
            if at >= horizon {
                break;
            }
            self.playback.trigger_at(at);
            self.upcoming.push_back((at, self.next_index));
            self.last_scheduled = Some(at);
            self.next_index = (self.next_index + 1) % BEATS_PER_BAR;
            self.beats_from_anchor += 1;
        }
    }

    fn advance_visual(&mut self) {
        let clock = self.playback.current_time();
        while let Some(&(at, index)) = self.upcoming.front() {
            if at + VISUAL_BEAT_DELAY > clock {
                break;
            }
            self.upcoming.pop_front();
            self.beat_phase = index;
            self.events.push(ClickEvent::Beat { index });
        }
    }

    fn set_loading(&mut self, loading: bool) {
        if self.loading != loading {
            self.loading = loading;
            self.events.push(ClickEvent::Loading(loading));
        }
    }

    /// Drop into `Error`, release everything and queue one retry.
    fn fail(&mut self, error: PracticeError, now: f64) -> PracticeResult<()> {
        log::warn!("click track failed: {error}");
        self.set_loading(false);
        self.unbind();
        self.upcoming.clear();
        self.last_scheduled = None;
        self.lease = None;
        self.state = ClickState::Error;
        self.events.push(ClickEvent::Error(error.to_string()));
        if self.wants_run && error.is_retryable() {
            self.retry.schedule(now);
        }
        Err(error)
    }
}

impl<P: SamplePlayback> Drop for ClickTrack<P> {
    fn drop(&mut self) {
        self.playback.disarm();
    }
}
