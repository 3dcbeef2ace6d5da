//! Playback backend for a host that plays samples itself.
//!
//! The host owns the audio clock: it reports the time with
//! [`PlaybackQueue::set_time`] before each tick and drains the queued
//! instructions afterwards.

use std::sync::Arc;

use serde::Serialize;

use crate::dsp::sampler::SampleBuffer;

use super::SamplePlayback;

/// A recorded playback call, serializable for a JavaScript audio graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackInstruction {
    /// Load this sample as the one to trigger.
    #[serde(rename_all = "camelCase")]
    Arm { samples: Vec<f32>, sample_rate: u32 },
    /// Drop the armed sample and cancel triggers that have not sounded.
    Disarm,
    /// Play the armed sample at audio time `at` (seconds).
    Trigger { at: f64 },
}

#[derive(Debug, Default)]
pub struct PlaybackQueue {
    time: f64,
    armed: bool,
    pending: Vec<PlaybackInstruction>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the host's audio clock.
    pub fn set_time(&mut self, seconds: f64) {
        self.time = seconds;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Drain everything queued so far.
    pub fn take(&mut self) -> Vec<PlaybackInstruction> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending(&self) -> &[PlaybackInstruction] {
        &self.pending
    }
}

impl SamplePlayback for PlaybackQueue {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn arm(&mut self, sound: Arc<SampleBuffer>) {
        self.armed = true;
        self.pending.push(PlaybackInstruction::Arm {
            samples: sound.data.iter().map(|&s| s as f32).collect(),
            sample_rate: sound.sample_rate,
        });
    }

    fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        self.pending.push(PlaybackInstruction::Disarm);
    }

    fn trigger_at(&mut self, when: f64) {
        if self.armed {
            self.pending.push(PlaybackInstruction::Trigger { at: when });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::new(vec![0.5, -0.25], 22050))
    }

    #[test]
    fn queues_arm_and_triggers_in_order() {
        let mut queue = PlaybackQueue::new();
        queue.trigger_at(0.1);
        assert!(queue.pending().is_empty());

        queue.arm(buffer());
        queue.trigger_at(0.5);
        assert_eq!(
            queue.take(),
            vec![
                PlaybackInstruction::Arm {
                    samples: vec![0.5, -0.25],
                    sample_rate: 22050
                },
                PlaybackInstruction::Trigger { at: 0.5 },
            ]
        );
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn disarm_after_drain_tells_the_host() {
        let mut queue = PlaybackQueue::new();
        queue.arm(buffer());
        queue.trigger_at(1.0);
        queue.take();

        queue.disarm();
        queue.disarm();
        assert_eq!(queue.take(), vec![PlaybackInstruction::Disarm]);
        assert!(!queue.is_armed());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(PlaybackInstruction::Arm {
            samples: vec![0.5],
            sample_rate: 44100,
        })
        .unwrap();
        assert_eq!(json["type"], "arm");
        assert_eq!(json["sampleRate"], 44100);
        let json = serde_json::to_value(PlaybackInstruction::Trigger { at: 1.5 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "trigger", "at": 1.5}));
    }
}
