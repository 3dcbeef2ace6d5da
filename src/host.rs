//! Native host loop.
//!
//! Drives the tuner, drone and click track from one tokio interval at the
//! frame cadence and forwards their events to a channel until shut down.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::click::{ClickEvent, ClickTrack, SamplePlayback};
use crate::detector::{InputDevice, PitchDetector, SAMPLE_INTERVAL_SECONDS, TunerEvent};
use crate::drone::{DroneEngine, DroneEvent, SynthBackend};

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Tuner(TunerEvent),
    Drone(DroneEvent),
    Click(ClickEvent),
}

pub struct PracticeHost<D: InputDevice, B: SynthBackend, P: SamplePlayback> {
    pub tuner: PitchDetector<D>,
    pub drone: DroneEngine<B>,
    pub click: ClickTrack<P>,
    epoch: Instant,
}

impl<D: InputDevice, B: SynthBackend, P: SamplePlayback> PracticeHost<D, B, P> {
    pub fn new(tuner: PitchDetector<D>, drone: DroneEngine<B>, click: ClickTrack<P>) -> Self {
        PracticeHost {
            tuner,
            drone,
            click,
            epoch: Instant::now(),
        }
    }

    /// Seconds since the host was created; the time passed to every tick.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Tick all three tools once.
    pub fn step(&mut self, now: f64) -> Vec<HostEvent> {
        let mut events = Vec::new();
        if let Some(e) = self.tuner.tick(now) {
            events.push(HostEvent::Tuner(e));
        }
        if let Some(e) = self.drone.tick(now) {
            events.push(HostEvent::Drone(e));
        }
        events.extend(self.click.tick(now).into_iter().map(HostEvent::Click));
        events
    }

    /// Run until `shutdown` becomes true (or its sender is dropped), then
    /// stop every tool.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        events: mpsc::UnboundedSender<HostEvent>,
    ) {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(SAMPLE_INTERVAL_SECONDS));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        log::info!("practice host running");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.now();
                    for event in self.step(now) {
                        if events.send(event).is_err() {
                            log::debug!("event receiver dropped");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.tuner.stop();
        self.drone.stop();
        self.click.shutdown();
        log::info!("practice host stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::click::{SoundLibrary, SynthCatalog};
    use crate::config::TunerConfig;
    use crate::detector::InputStream;
    use crate::drone::{DroneSession, InstructionQueue};
    use crate::dsp::sampler::SampleBuffer;
    use crate::session::{AudioSession, HostOutput};

    struct Silence;

    impl InputStream for Silence {
        fn sample_rate(&self) -> u32 {
            44100
        }

        fn read_latest(&mut self, window: &mut [f32]) -> Result<usize, String> {
            window.fill(0.0);
            Ok(window.len())
        }
    }

    struct QuietMic;

    impl InputDevice for QuietMic {
        type Stream = Silence;

        fn open(&mut self) -> Result<Silence, String> {
            Ok(Silence)
        }
    }

    /// Playback whose audio clock is wall time.
    struct WallClock {
        epoch: Instant,
        armed: bool,
        triggers: usize,
    }

    impl SamplePlayback for WallClock {
        fn current_time(&self) -> f64 {
            self.epoch.elapsed().as_secs_f64()
        }

        fn arm(&mut self, _sound: Arc<SampleBuffer>) {
            self.armed = true;
        }

        fn disarm(&mut self) {
            self.armed = false;
        }

        fn trigger_at(&mut self, _when: f64) {
            self.triggers += 1;
        }
    }

    #[tokio::test]
    async fn runs_until_shutdown() {
        let output = AudioSession::new(HostOutput);
        let mut library = SoundLibrary::new(SynthCatalog::default());
        library.prewarm(&["click"]);
        let playback = WallClock {
            epoch: Instant::now(),
            armed: false,
            triggers: 0,
        };

        let mut host = PracticeHost::new(
            PitchDetector::new(QuietMic, TunerConfig::default()),
            DroneEngine::new(
                DroneSession::default(),
                InstructionQueue::new(),
                output.clone(),
            ),
            ClickTrack::new(playback, library, output.clone()),
        );
        host.tuner.start(0.0).unwrap();
        host.drone.toggle_note(0).unwrap();
        host.drone.play(0.0).unwrap();
        host.click.start(300, "click", 0.0).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = shutdown_tx.send(true);
        });
        host.run(shutdown_rx, event_tx).await;

        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        assert!(events.contains(&HostEvent::Click(ClickEvent::Started)));
        assert!(events.iter().any(|e| matches!(e, HostEvent::Click(ClickEvent::Beat { .. }))));
        assert!(events.iter().any(|e| matches!(
            e,
            HostEvent::Tuner(TunerEvent::Reading { .. })
        )));

        assert!(host.click.playback().triggers >= 1);
        assert!(!host.click.playback().armed);
        assert!(!host.drone.is_playing());
        assert_eq!(output.leases(), 0);
    }
}
