//! Listening and playback session
//!
//! Owns every component and moves data between them:
//! frames -> energy analyzer -> beat tracker -> tempo slot -> scheduler.
//! Taps and manual entry write the same tempo slot. Everything a display
//! would show is reported through `SessionObserver`.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::analysis::{BeatTracker, EnergyAnalyzer, TapTempo};
use crate::audio::FrameSource;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::rhythm::{Pattern, PatternInfo, PatternLibrary, RhythmScheduler, TriggerSink, Voice};

/// Notifications for a display. All methods default to no-ops.
pub trait SessionObserver: Send {
    /// The published tempo changed; `None` means no current estimate
    fn on_bpm(&mut self, _bpm: Option<u32>) {}
    /// RMS energy of the latest frame
    fn on_energy(&mut self, _energy: f32) {}
    /// An onset was detected at this clock time
    fn on_onset(&mut self, _timestamp_ms: f64) {}
    /// Samples of the latest frame
    fn on_waveform(&mut self, _samples: &[f32]) {}
    /// The detected tempo has settled
    fn on_stable(&mut self, _bpm: u32) {}
    /// A step was scheduled; it sounds at `time_s` on the session clock
    fn on_step(&mut self, _step: usize, _time_s: f64) {}
}

/// Observer that ignores everything
pub struct NullObserver;

impl SessionObserver for NullObserver {}

type SharedObserver = Arc<Mutex<Box<dyn SessionObserver>>>;

pub struct Session {
    config: Config,
    clock: Arc<dyn Clock>,
    analyzer: EnergyAnalyzer,
    tracker: BeatTracker,
    tap: TapTempo,
    library: PatternLibrary,
    scheduler: RhythmScheduler,
    source: Option<Box<dyn FrameSource>>,
    observer: SharedObserver,
    /// Last value sent through `on_bpm`
    published_bpm: Option<u32>,
    /// Tempo the rhythm plays at
    tempo: u32,
    stable_announced: bool,
}

impl Session {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        observer: Box<dyn SessionObserver>,
    ) -> Result<Self> {
        let library = PatternLibrary::new(config.random);
        Self::with_library(config, clock, observer, library)
    }

    /// Session with a caller-supplied library (seeded randomizer)
    pub fn with_library(
        mut config: Config,
        clock: Arc<dyn Clock>,
        observer: Box<dyn SessionObserver>,
        mut library: PatternLibrary,
    ) -> Result<Self> {
        config.validate()?;

        let observer: SharedObserver = Arc::new(Mutex::new(observer));
        let mut scheduler = RhythmScheduler::new(config.scheduler.clone(), Arc::clone(&clock));
        let step_observer = Arc::clone(&observer);
        scheduler.on_step(move |step, time_s| step_observer.lock().on_step(step, time_s));

        let initial = library.select(&config.session.initial_pattern);
        scheduler.set_pattern(initial);
        let tempo = config.session.default_bpm;
        scheduler.set_tempo(tempo as f64)?;

        Ok(Self {
            analyzer: EnergyAnalyzer::new(config.analyzer.clone()),
            tracker: BeatTracker::new(config.tracker.clone()),
            tap: TapTempo::new(config.tap.clone()),
            library,
            scheduler,
            source: None,
            observer,
            published_bpm: None,
            tempo,
            stable_announced: false,
            clock,
            config,
        })
    }

    // =========================================================================
    // Listening
    // =========================================================================

    /// Start analysing frames from `source`, replacing any current source
    pub fn start_listening(&mut self, source: Box<dyn FrameSource>) {
        if self.source.is_some() {
            log::info!("Replacing audio source");
        }
        self.reset_detection();
        self.source = Some(source);
        log::info!("Listening started");
    }

    /// Drop the audio source. Safe to call when not listening.
    pub fn stop_listening(&mut self) {
        if self.source.take().is_some() {
            self.reset_detection();
            log::info!("Listening stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.source.is_some()
    }

    /// Pull and analyse one frame.
    ///
    /// Returns false if nothing was analysed (not listening or no new
    /// samples). A source error stops listening and is returned.
    pub fn process_frame(&mut self) -> Result<bool> {
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                let now = self.clock.now_ms();
                self.check_silence(now);
                return Ok(false);
            }
            Err(e) => {
                log::error!("Audio source failed: {}", e);
                self.stop_listening();
                return Err(e);
            }
        };

        let observation = self.analyzer.observe(&frame);
        {
            let mut observer = self.observer.lock();
            observer.on_waveform(&frame.samples);
            observer.on_energy(observation.energy);
            if observation.onset {
                observer.on_onset(frame.timestamp_ms);
            }
        }

        if observation.onset {
            if let Some(bpm) = self.tracker.record_onset(frame.timestamp_ms) {
                self.publish(Some(bpm));
            }
        } else {
            self.check_silence(frame.timestamp_ms);
        }

        self.update_stability()?;
        Ok(true)
    }

    fn check_silence(&mut self, now_ms: f64) {
        if self.tracker.check_silence(now_ms) {
            self.stable_announced = false;
            self.publish(None);
        }
    }

    fn update_stability(&mut self) -> Result<()> {
        if !self.tracker.is_stable() {
            self.stable_announced = false;
            return Ok(());
        }
        if self.stable_announced {
            return Ok(());
        }
        let Some(bpm) = self.tracker.stable_bpm() else {
            return Ok(());
        };

        self.stable_announced = true;
        log::info!("Tempo stable at {} BPM", bpm);
        self.observer.lock().on_stable(bpm);

        let auto_start = self.config.session.auto_start_on_stable && !self.scheduler.is_playing();
        match self.tracker.stability().fixed_reference() {
            // Live playing agrees with the fixed tempo, which stays in charge
            Some(fixed) => {
                if auto_start {
                    let pattern = self.library.active_pattern();
                    self.scheduler.start(pattern, fixed as f64)?;
                }
            }
            None => {
                self.set_tempo_slot(bpm)?;
                if auto_start {
                    self.start_rhythm()?;
                }
            }
        }
        Ok(())
    }

    fn reset_detection(&mut self) {
        self.analyzer.reset();
        self.tracker.reset();
        self.stable_announced = false;
    }

    fn publish(&mut self, bpm: Option<u32>) {
        if bpm == self.published_bpm {
            return;
        }
        self.published_bpm = bpm;
        match bpm {
            Some(bpm) => log::info!("BPM: {}", bpm),
            None => log::info!("BPM: --"),
        }
        self.observer.lock().on_bpm(bpm);
    }

    // =========================================================================
    // Tempo slot
    // =========================================================================

    /// Register a tap at the current clock time. A tap tempo becomes the
    /// tempo slot.
    pub fn tap(&mut self) -> Option<u32> {
        let bpm = self.tap.tap(self.clock.now_ms())?;
        if let Err(e) = self.set_tempo_slot(bpm) {
            log::warn!("Tapped tempo rejected: {}", e);
            return None;
        }
        self.publish(Some(bpm));
        Some(bpm)
    }

    /// Commit the current tempo.
    ///
    /// Tapped tempo wins over the detected one. Listening stops and the
    /// tracker keeps the chosen tempo as its stability reference.
    pub fn fix_bpm(&mut self) -> Result<Option<u32>> {
        let chosen = self
            .tap
            .bpm()
            .or_else(|| self.tracker.stable_bpm())
            .or_else(|| self.tracker.last_bpm());

        self.stop_listening();

        let Some(bpm) = chosen else {
            log::warn!("No tempo to fix yet");
            return Ok(None);
        };

        self.set_tempo_slot(bpm)?;
        self.tracker.lock_reference(Some(bpm));
        self.publish(Some(bpm));
        log::info!("Tempo fixed at {} BPM", bpm);
        Ok(Some(bpm))
    }

    /// Forget a fixed tempo; stability follows the live readings again
    pub fn release_fixed_bpm(&mut self) {
        self.tracker.lock_reference(None);
    }

    /// Type in a tempo. Accepted inside the tap tempo range.
    pub fn set_manual_bpm(&mut self, bpm: u32) -> Result<()> {
        if bpm < self.config.tap.min_bpm || bpm > self.config.tap.max_bpm {
            return Err(Error::InvalidTempo(bpm as f64));
        }
        self.set_tempo_slot(bpm)?;
        self.publish(Some(bpm));
        Ok(())
    }

    fn set_tempo_slot(&mut self, bpm: u32) -> Result<()> {
        self.scheduler.set_tempo(bpm as f64)?;
        self.tempo = bpm;
        Ok(())
    }

    /// Tempo the rhythm plays at
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Last published BPM
    pub fn published_bpm(&self) -> Option<u32> {
        self.published_bpm
    }

    // =========================================================================
    // Patterns
    // =========================================================================

    pub fn select_pattern(&mut self, id: &str) -> Pattern {
        let pattern = self.library.select(id);
        self.scheduler.set_pattern(pattern);
        pattern
    }

    pub fn edit_step(&mut self, voice: Voice, index: usize, active: bool) -> Result<()> {
        self.library.set_custom_step(voice, index, active)?;
        self.scheduler.set_pattern(self.library.active_pattern());
        Ok(())
    }

    /// Generate a new random pattern and select it
    pub fn randomize_pattern(&mut self) -> Pattern {
        self.library.generate_random();
        self.select_pattern(crate::rhythm::patterns::RANDOM_ID)
    }

    pub fn patterns(&self) -> Vec<PatternInfo> {
        self.library.list()
    }

    pub fn active_pattern_id(&self) -> &str {
        self.library.active_id()
    }

    // =========================================================================
    // Rhythm
    // =========================================================================

    pub fn start_rhythm(&mut self) -> Result<()> {
        let pattern = self.library.active_pattern();
        self.scheduler.start(pattern, self.tempo as f64)
    }

    pub fn stop_rhythm(&mut self) {
        self.scheduler.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    /// Schedule due steps into `sink`
    pub fn poll_rhythm(&mut self, sink: &mut dyn TriggerSink) -> usize {
        self.scheduler.poll(sink)
    }

    pub fn tracker(&self) -> &BeatTracker {
        &self.tracker
    }

    pub fn scheduler(&self) -> &RhythmScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
