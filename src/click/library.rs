//! Click sound assets.
//!
//! A [`SoundCatalog`] enumerates and decodes sounds. [`SoundLibrary`] sits on
//! top of it and tracks each asset's lifecycle: requested assets are queued
//! and decoded on the next [`SoundLibrary::process_pending`] call, so a
//! request never blocks the caller. Pre-warmed assets are decoded up front
//! and never released.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::dsp::envelope::{Envelope, EnvelopeShape};
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::sampler::SampleBuffer;
use crate::error::PracticeError;

/// Enumerable source of decodable sounds.
pub trait SoundCatalog {
    fn ids(&self) -> Vec<String>;
    fn decode(&mut self, id: &str) -> Result<SampleBuffer, String>;

    /// Override when listing every id is expensive.
    fn contains(&self, id: &str) -> bool {
        self.ids().iter().any(|known| known == id)
    }
}

/// Built-in sounds synthesized on demand: `click`, `beep` and `wood`.
#[derive(Debug, Clone)]
pub struct SynthCatalog {
    sample_rate: u32,
}

impl SynthCatalog {
    pub const IDS: [&'static str; 3] = ["click", "beep", "wood"];

    pub fn new(sample_rate: u32) -> Self {
        SynthCatalog { sample_rate }
    }
}

impl Default for SynthCatalog {
    fn default() -> Self {
        SynthCatalog::new(44100)
    }
}

impl SoundCatalog for SynthCatalog {
    fn ids(&self) -> Vec<String> {
        Self::IDS.iter().map(|id| id.to_string()).collect()
    }

    fn decode(&mut self, id: &str) -> Result<SampleBuffer, String> {
        let sr = self.sample_rate;
        let data = match id {
            "click" => render_hit(Waveform::Square, 2000.0, None, 0.02, sr),
            "beep" => render_hit(Waveform::Sine, 1000.0, None, 0.08, sr),
            "wood" => render_hit(Waveform::Triangle, 800.0, Some(500.0), 0.05, sr),
            _ => return Err(format!("no built-in sound named '{id}'")),
        };
        Ok(SampleBuffer::new(data, sr))
    }
}

/// A short percussive tone: instant attack, linear decay to silence.
fn render_hit(
    waveform: Waveform,
    frequency: f64,
    drop_to: Option<f64>,
    decay: f64,
    sample_rate: u32,
) -> Vec<f64> {
    let sr = sample_rate as f64;
    let mut osc = Oscillator::new(waveform, sr);
    osc.set_frequency(frequency);
    if let Some(target) = drop_to {
        osc.glide_to(target, decay);
    }
    let mut env = Envelope::new(EnvelopeShape::new(0.001, decay, 0.0, 0.0), sr);
    env.gate_on();

    let len = ((0.001 + decay) * sr).ceil() as usize;
    (0..len)
        .map(|_| osc.next_sample() * env.next_sample() * 0.8)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetState {
    Unloaded,
    Loading,
    Loaded(Arc<SampleBuffer>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SoundAsset {
    pub id: String,
    pub state: AssetState,
}

/// Where a requested sound stands.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Ready(Arc<SampleBuffer>),
    Pending,
    Failed(PracticeError),
}

pub struct SoundLibrary {
    catalog: Box<dyn SoundCatalog + Send>,
    assets: HashMap<String, SoundAsset>,
    prewarmed: HashSet<String>,
    queue: VecDeque<String>,
}

impl SoundLibrary {
    pub fn new(catalog: impl SoundCatalog + Send + 'static) -> Self {
        SoundLibrary {
            catalog: Box::new(catalog),
            assets: HashMap::new(),
            prewarmed: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.catalog.ids()
    }

    /// Decode `ids` now and keep them for the life of the library.
    pub fn prewarm(&mut self, ids: &[&str]) {
        for &id in ids {
            self.prewarmed.insert(id.to_string());
            self.decode(id);
        }
    }

    /// Ask for a sound. Unloaded (or previously failed) sounds are queued
    /// for decoding and report `Pending`.
    pub fn request(&mut self, id: &str) -> LoadStatus {
        if let Some(AssetState::Loaded(buffer)) = self.assets.get(id).map(|a| &a.state) {
            return LoadStatus::Ready(Arc::clone(buffer));
        }
        if !self.catalog.contains(id) {
            return LoadStatus::Failed(PracticeError::DecodeFailed {
                id: id.to_string(),
                reason: "unknown sound".to_string(),
            });
        }
        let asset = self
            .assets
            .entry(id.to_string())
            .or_insert_with(|| SoundAsset {
                id: id.to_string(),
                state: AssetState::Unloaded,
            });
        match &asset.state {
            AssetState::Loaded(buffer) => LoadStatus::Ready(Arc::clone(buffer)),
            AssetState::Loading => LoadStatus::Pending,
            AssetState::Unloaded | AssetState::Failed(_) => {
                asset.state = AssetState::Loading;
                self.queue.push_back(id.to_string());
                LoadStatus::Pending
            }
        }
    }

    /// Current status without queueing anything.
    pub fn status(&self, id: &str) -> LoadStatus {
        match self.assets.get(id).map(|a| &a.state) {
            Some(AssetState::Loaded(buffer)) => LoadStatus::Ready(Arc::clone(buffer)),
            Some(AssetState::Failed(reason)) => LoadStatus::Failed(PracticeError::DecodeFailed {
                id: id.to_string(),
                reason: reason.clone(),
            }),
            _ => LoadStatus::Pending,
        }
    }

    pub fn asset(&self, id: &str) -> Option<&SoundAsset> {
        self.assets.get(id)
    }

    /// Decode everything queued. Returns how many assets were processed.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(id) = self.queue.pop_front() {
            self.decode(&id);
            processed += 1;
        }
        processed
    }

    pub fn is_loading(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drop a decoded sound that is no longer armed. Pre-warmed sounds stay.
    pub fn release(&mut self, id: &str) {
        if self.prewarmed.contains(id) {
            return;
        }
        if self.assets.remove(id).is_some() {
            self.queue.retain(|queued| queued != id);
            log::debug!("released sound '{id}'");
        }
    }

    fn decode(&mut self, id: &str) {
        let state = match self.catalog.decode(id) {
            Ok(buffer) => {
                log::debug!("decoded sound '{id}' ({:.3}s)", buffer.duration());
                AssetState::Loaded(Arc::new(buffer))
            }
            Err(reason) => {
                log::warn!("failed to decode sound '{id}': {reason}");
                AssetState::Failed(reason)
            }
        };
        self.assets.insert(
            id.to_string(),
            SoundAsset {
                id: id.to_string(),
                state,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn synth_sounds_are_short_and_audible() {
        let mut catalog = SynthCatalog::new(48000);
        for id in SynthCatalog::IDS {
            let buf = catalog.decode(id).unwrap();
            assert!(buf.duration() < 0.1, "{id} too long");
            let peak = buf.data.iter().fold(0.0f64, |m, s| m.max(s.abs()));
            assert!(peak > 0.1, "{id} should be audible, peak {peak}");
            assert!(buf.data.last().is_some_and(|s| s.abs() < 0.05));
        }
        assert!(catalog.decode("cowbell").is_err());
    }

    #[test]
    fn request_queues_then_loads() {
        let mut lib = SoundLibrary::new(SynthCatalog::default());
        assert_eq!(lib.request("beep"), LoadStatus::Pending);
        assert_eq!(lib.request("beep"), LoadStatus::Pending);
        assert!(lib.is_loading());

        assert_eq!(lib.process_pending(), 1);
        assert!(!lib.is_loading());
        assert!(matches!(lib.request("beep"), LoadStatus::Ready(_)));
    }

    /// Counts how often the catalog is asked to list its ids.
    struct CountingCatalog {
        listings: Arc<AtomicUsize>,
    }

    impl SoundCatalog for CountingCatalog {
        fn ids(&self) -> Vec<String> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            vec!["tick".to_string()]
        }

        fn decode(&mut self, _id: &str) -> Result<SampleBuffer, String> {
            Ok(SampleBuffer::new(vec![1.0], 44100))
        }
    }

    #[test]
    fn loaded_sounds_skip_the_catalog_lookup() {
        let listings = Arc::new(AtomicUsize::new(0));
        let mut lib = SoundLibrary::new(CountingCatalog {
            listings: Arc::clone(&listings),
        });
        assert_eq!(lib.request("tick"), LoadStatus::Pending);
        lib.process_pending();
        for _ in 0..5 {
            assert!(matches!(lib.request("tick"), LoadStatus::Ready(_)));
        }
        assert_eq!(listings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_sound_fails() {
        let mut lib = SoundLibrary::new(SynthCatalog::default());
        assert!(matches!(
            lib.request("cowbell"),
            LoadStatus::Failed(PracticeError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn prewarmed_sounds_survive_release() {
        let mut lib = SoundLibrary::new(SynthCatalog::default());
        lib.prewarm(&["click"]);
        assert!(matches!(lib.status("click"), LoadStatus::Ready(_)));

        lib.release("click");
        assert!(matches!(lib.status("click"), LoadStatus::Ready(_)));

        lib.request("wood");
        lib.process_pending();
        lib.release("wood");
        assert!(lib.asset("wood").is_none());
        assert_eq!(lib.status("wood"), LoadStatus::Pending);
    }
}
