//! Live pitch detection from a microphone stream.
//!
//! `PitchDetector` opens an input stream on `start`, then on each `tick`
//! (at most once per [`SAMPLE_INTERVAL_SECONDS`]) reads the latest window
//! and turns it into a [`TunerReading`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::config::TunerConfig;
use crate::dsp::tuner::{estimate_pitch, rms};
use crate::error::{PracticeError, PracticeResult};
use crate::retry::RetryTimer;
use crate::theory::{NotePitch, frequency_to_note};

/// Minimum spacing between analysis frames.
pub const SAMPLE_INTERVAL_SECONDS: f64 = 0.016;

/// An open microphone stream.
pub trait InputStream {
    fn sample_rate(&self) -> u32;
    /// Fill `window` with the most recent samples. Returns how many were
    /// written; fewer than `window.len()` means the stream is still filling.
    fn read_latest(&mut self, window: &mut [f32]) -> Result<usize, String>;
}

/// Something that can open a microphone. Dropping the stream releases it.
pub trait InputDevice {
    type Stream: InputStream;
    fn open(&mut self) -> Result<Self::Stream, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Listening,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchReading {
    pub note: NotePitch,
    pub cents_deviation: f64,
    pub frequency_hz: f64,
    pub clarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TunerReading {
    Pitch(PitchReading),
    NoPitch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TunerEvent {
    Reading {
        reading: TunerReading,
        timestamp: f64,
    },
    Error(String),
}

/// Analyse one window: silence gate, pitch estimate, then the clarity and
/// range checks.
pub fn analyse_window(window: &[f32], sample_rate: u32, config: &TunerConfig) -> TunerReading {
    if rms(window) < config.silence_gate {
        return TunerReading::NoPitch;
    }
    let Some(estimate) = estimate_pitch(window, sample_rate, config.min_frequency_hz) else {
        return TunerReading::NoPitch;
    };
    if estimate.clarity < config.clarity_threshold
        || estimate.frequency < config.min_frequency_hz
        || estimate.frequency > config.max_frequency_hz
    {
        return TunerReading::NoPitch;
    }
    match frequency_to_note(estimate.frequency) {
        Some(reading) => TunerReading::Pitch(PitchReading {
            note: reading.note,
            cents_deviation: reading.cents_deviation,
            frequency_hz: estimate.frequency,
            clarity: estimate.clarity,
        }),
        None => TunerReading::NoPitch,
    }
}

pub struct PitchDetector<D: InputDevice> {
    device: D,
    stream: Option<D::Stream>,
    state: DetectorState,
    config: TunerConfig,
    window: Vec<f32>,
    /// Set between `start` and `stop`; a retry only fires while set.
    wants_listen: bool,
    retry: RetryTimer,
    last_frame: Option<f64>,
}

impl<D: InputDevice> PitchDetector<D> {
    pub fn new(device: D, config: TunerConfig) -> Self {
        let window = vec![0.0; config.window_size];
        PitchDetector {
            device,
            stream: None,
            state: DetectorState::Idle,
            config,
            window,
            wants_listen: false,
            retry: RetryTimer::default(),
            last_frame: None,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    /// Open the microphone and start listening. On failure the detector
    /// enters `Error` and retries once after the retry delay.
    pub fn start(&mut self, now: f64) -> PracticeResult<()> {
        self.wants_listen = true;
        if self.state == DetectorState::Listening {
            return Ok(());
        }
        self.retry.cancel();
        self.open(now)
    }

    /// Release the microphone and any pending retry. Safe from any state.
    pub fn stop(&mut self) {
        self.wants_listen = false;
        self.retry.cancel();
        self.stream = None;
        self.last_frame = None;
        if self.state != DetectorState::Idle {
            log::info!("tuner stopped");
            self.state = DetectorState::Idle;
        }
    }

    /// Fire a due retry, then analyse the latest window if a frame is due.
    pub fn tick(&mut self, now: f64) -> Option<TunerEvent> {
        if self.retry.poll(now) && self.wants_listen && self.state == DetectorState::Error {
            log::warn!("retrying microphone");
            if let Err(e) = self.open(now) {
                return Some(TunerEvent::Error(e.to_string()));
            }
        }
        if self.state != DetectorState::Listening {
            return None;
        }
        if self
            .last_frame
            .is_some_and(|last| now - last < SAMPLE_INTERVAL_SECONDS)
        {
            return None;
        }
        self.last_frame = Some(now);

        let stream = self.stream.as_mut()?;
        let sample_rate = stream.sample_rate();
        match stream.read_latest(&mut self.window) {
            Ok(n) => {
                let filled = n.min(self.window.len());
                let reading = analyse_window(&self.window[..filled], sample_rate, &self.config);
                Some(TunerEvent::Reading {
                    reading,
                    timestamp: now,
                })
            }
            Err(reason) => {
                let e = self.fail(reason, now);
                Some(TunerEvent::Error(e.to_string()))
            }
        }
    }

    fn open(&mut self, now: f64) -> PracticeResult<()> {
        match self.device.open() {
            Ok(stream) => {
                log::info!("tuner listening at {} Hz", stream.sample_rate());
                self.stream = Some(stream);
                self.state = DetectorState::Listening;
                self.last_frame = None;
                Ok(())
            }
            Err(reason) => Err(self.fail(reason, now)),
        }
    }

    fn fail(&mut self, reason: String, now: f64) -> PracticeError {
        log::warn!("microphone unavailable: {reason}");
        self.stream = None;
        self.state = DetectorState::Error;
        if self.wants_listen {
            self.retry.schedule(now);
        }
        PracticeError::AcquisitionFailed(reason)
    }
}

/// Microphone whose audio is captured by the host and pushed in.
///
/// Clones share one buffer: the host keeps a clone to push samples and
/// report permission while the detector owns another. Samples pushed while
/// no stream is open are dropped.
#[derive(Debug, Clone)]
pub struct FedInput {
    shared: Arc<Mutex<FeedState>>,
}

#[derive(Debug)]
struct FeedState {
    sample_rate: u32,
    capacity: usize,
    denied: Option<String>,
    open: bool,
    samples: VecDeque<f32>,
}

impl FedInput {
    /// Keeps the latest `capacity` samples.
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        FedInput {
            shared: Arc::new(Mutex::new(FeedState {
                sample_rate,
                capacity: capacity.max(1),
                denied: None,
                open: false,
                samples: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, samples: &[f32]) {
        let mut state = self.lock();
        if !state.open {
            return;
        }
        state.samples.extend(samples.iter().copied());
        let excess = state.samples.len().saturating_sub(state.capacity);
        state.samples.drain(..excess);
    }

    /// Refuse future opens with `reason`, e.g. after the user declined
    /// microphone access. The open stream keeps running.
    pub fn deny(&self, reason: &str) {
        self.lock().denied = Some(reason.to_string());
    }

    pub fn allow(&self) {
        self.lock().denied = None;
    }

    /// Whether a stream is open, i.e. the host should be capturing.
    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

impl InputDevice for FedInput {
    type Stream = FedStream;

    fn open(&mut self) -> Result<FedStream, String> {
        let mut state = self.lock();
        if let Some(reason) = &state.denied {
            return Err(reason.clone());
        }
        state.open = true;
        state.samples.clear();
        Ok(FedStream {
            shared: Arc::clone(&self.shared),
        })
    }
}

pub struct FedStream {
    shared: Arc<Mutex<FeedState>>,
}

impl FedStream {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InputStream for FedStream {
    fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    fn read_latest(&mut self, window: &mut [f32]) -> Result<usize, String> {
        let state = self.lock();
        let n = state.samples.len().min(window.len());
        let start = state.samples.len() - n;
        for (slot, &sample) in window.iter_mut().zip(state.samples.range(start..)) {
            *slot = sample;
        }
        Ok(n)
    }
}

impl Drop for FedStream {
    fn drop(&mut self) {
        let mut state = self.lock();
        state.open = false;
        state.samples.clear();
    }
}
