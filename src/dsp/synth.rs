//! Built-in drone synthesizer backend.

use crate::drone::SynthBackend;

use super::mixer::Mixer;
use super::voice::{DroneVoice, Timbre};

/// Renders drone voices slot by slot. Stopped or replaced voices keep
/// sounding through their release before they are dropped.
#[derive(Debug)]
pub struct DspSynth {
    sample_rate: f64,
    slots: Vec<Option<DroneVoice>>,
    fading: Vec<DroneVoice>,
    mixer: Mixer,
}

impl DspSynth {
    pub fn new(sample_rate: f64) -> Self {
        DspSynth {
            sample_rate,
            slots: Vec::new(),
            fading: Vec::new(),
            mixer: Mixer::new(),
        }
    }

    /// The voice held in `slot`, if any.
    pub fn voice(&self, slot: usize) -> Option<&DroneVoice> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Slots holding a voice that has not been released.
    pub fn active_slots(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Released voices still ringing out.
    pub fn fading_voices(&self) -> usize {
        self.fading.len()
    }

    /// Render one block of mono output.
    pub fn render(&mut self, out: &mut [f32]) {
        self.mixer.clear(out.len());
        for voice in self.slots.iter_mut().flatten().chain(self.fading.iter_mut()) {
            for i in 0..out.len() {
                self.mixer.add(i, voice.next_sample());
            }
        }
        self.fading.retain(|v| !v.is_finished());
        self.mixer.write_to(out);
    }

    fn release_slot(&mut self, slot: usize) {
        if let Some(mut voice) = self.slots.get_mut(slot).and_then(Option::take) {
            voice.note_off();
            self.fading.push(voice);
        }
    }
}

impl SynthBackend for DspSynth {
    fn start_voice(&mut self, slot: usize, frequency: f64, timbre: Timbre) {
        self.release_slot(slot);
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        let mut voice = DroneVoice::from_timbre(timbre, self.sample_rate);
        voice.note_on(frequency);
        self.slots[slot] = Some(voice);
    }

    fn retune_voice(&mut self, slot: usize, frequency: f64) {
        if let Some(voice) = self.slots.get_mut(slot).and_then(Option::as_mut) {
            voice.glide_to(frequency);
        }
    }

    fn stop_voice(&mut self, slot: usize) {
        self.release_slot(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_retune_stop() {
        let mut synth = DspSynth::new(44100.0);
        synth.start_voice(0, 220.0, Timbre::Pure);
        synth.start_voice(1, 330.0, Timbre::Pure);
        assert_eq!(synth.active_slots(), 2);

        synth.retune_voice(1, 275.0);
        assert_eq!(synth.voice(1).map(DroneVoice::frequency), Some(275.0));

        synth.stop_voice(0);
        assert_eq!(synth.active_slots(), 1);
        assert_eq!(synth.fading_voices(), 1);

        // Pure release is 0.25 s
        let mut out = vec![0.0f32; 22050];
        synth.render(&mut out);
        assert_eq!(synth.fading_voices(), 0);
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn restarting_a_slot_fades_the_old_voice() {
        let mut synth = DspSynth::new(44100.0);
        synth.start_voice(2, 110.0, Timbre::Soft);
        synth.start_voice(2, 110.0, Timbre::Reed);
        assert_eq!(synth.active_slots(), 1);
        assert_eq!(synth.fading_voices(), 1);
        assert_eq!(synth.voice(2).map(DroneVoice::timbre), Some(Timbre::Reed));
    }

    #[test]
    fn retune_of_empty_slot_is_ignored() {
        let mut synth = DspSynth::new(44100.0);
        synth.retune_voice(5, 440.0);
        synth.stop_voice(5);
        assert_eq!(synth.active_slots(), 0);
        let mut out = vec![0.0f32; 64];
        synth.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
