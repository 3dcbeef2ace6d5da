//! Sample playback for the click track.
//!
//! [`ClickPlayer`] is the built-in [`SamplePlayback`] backend: it owns the
//! audio clock (frames rendered so far), plays the armed sample at
//! sample-accurate trigger times, and resamples buffers whose native rate
//! differs from the output rate with linear interpolation.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::click::SamplePlayback;

/// A decoded mono sample held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Mono f64 samples.
    pub data: Vec<f64>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f64>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    /// Create from 16-bit signed PCM, downmixing interleaved channels.
    pub fn from_i16(pcm: &[i16], channels: u16, sample_rate: u32) -> Self {
        let scaled: Vec<f64> = pcm.iter().map(|&s| s as f64 / 32768.0).collect();
        SampleBuffer::new(downmix(&scaled, channels), sample_rate)
    }

    /// Create from f32 samples, downmixing interleaved channels.
    pub fn from_f32(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let widened: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        SampleBuffer::new(downmix(&widened, channels), sample_rate)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length in seconds at the native rate.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.sample_rate as f64
    }

    /// Read a sample with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, position: f64) -> f64 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize;
        if idx >= self.data.len() - 1 {
            return self.data.get(idx).copied().unwrap_or(0.0);
        }

        let frac = position - idx as f64;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }
}

fn downmix(interleaved: &[f64], channels: u16) -> Vec<f64> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect()
}

/// One triggered playback of the armed sample.
#[derive(Debug)]
struct Playhead {
    buffer: Arc<SampleBuffer>,
    position: f64,
    step: f64,
}

/// Renders click samples against its own frame clock.
#[derive(Debug)]
pub struct ClickPlayer {
    pub gain: f64,
    sample_rate: f64,
    /// Frames rendered so far; the audio clock.
    frames: u64,
    armed: Option<Arc<SampleBuffer>>,
    /// Trigger frames, ascending.
    pending: VecDeque<u64>,
    playing: Vec<Playhead>,
}

impl ClickPlayer {
    pub fn new(sample_rate: f64) -> Self {
        ClickPlayer {
            gain: 0.9,
            sample_rate,
            frames: 0,
            armed: None,
            pending: VecDeque::new(),
            playing: Vec::new(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Triggered samples still sounding.
    pub fn sounding(&self) -> usize {
        self.playing.len()
    }

    /// Triggers scheduled but not yet reached.
    pub fn pending_triggers(&self) -> usize {
        self.pending.len()
    }

    /// Render the next block and advance the clock by `out.len()` frames.
    pub fn render(&mut self, out: &mut [f32]) {
        for (i, o) in out.iter_mut().enumerate() {
            let frame = self.frames + i as u64;
            while self.pending.front().is_some_and(|&at| at <= frame) {
                self.pending.pop_front();
                if let Some(buffer) = &self.armed {
                    self.playing.push(Playhead {
                        step: buffer.sample_rate as f64 / self.sample_rate,
                        buffer: Arc::clone(buffer),
                        position: 0.0,
                    });
                }
            }

            let mut sum = 0.0;
            for head in &mut self.playing {
                sum += head.buffer.read_interpolated(head.position);
                head.position += head.step;
            }
            self.playing
                .retain(|head| head.position < head.buffer.len() as f64);
            *o = (sum * self.gain).clamp(-1.0, 1.0) as f32;
        }
        self.frames += out.len() as u64;
    }
}

impl SamplePlayback for ClickPlayer {
    fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    fn arm(&mut self, sound: Arc<SampleBuffer>) {
        self.armed = Some(sound);
    }

    /// Clicks already sounding ring out; each holds its own buffer.
    fn disarm(&mut self) {
        self.armed = None;
        self.pending.clear();
    }

    fn trigger_at(&mut self, when: f64) {
        let frame = (when.max(0.0) * self.sample_rate).round() as u64;
        let idx = self.pending.partition_point(|&at| at <= frame);
        self.pending.insert(idx, frame);
    }
}
