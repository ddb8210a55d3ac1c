//! Step scheduler for drum patterns
//!
//! A recurring timer wakes the scheduler well inside every step. Each wake-up
//! reads the clock and emits triggers for every step whose start time falls
//! inside the lookahead window, so hits are handed to the output ahead of
//! time and land on exact step boundaries even if the wake-ups jitter.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::events::{Trigger, TriggerSink};
use super::patterns::{Pattern, STEPS_PER_PATTERN};
use super::timer::{IntervalTimer, Timer, TimerHandle};
use crate::clock::Clock;
use crate::error::{Error, Result};

/// Configuration for `RhythmScheduler`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Timer period; shortened to one step at fast tempos
    pub tick_ms: f64,
    /// How far ahead of the clock steps are scheduled
    pub lookahead_ms: f64,
    /// Velocity multiplier on step 0
    pub accent: f32,
    pub base_velocity: f32,
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 25.0,
            lookahead_ms: 100.0,
            accent: 1.2,
            base_velocity: 1.0,
            min_bpm: 30.0,
            max_bpm: 300.0,
        }
    }
}

/// Seconds per sixteenth-note step
pub fn step_duration(bpm: f64) -> f64 {
    60.0 / bpm / 4.0
}

/// Live schedule, present from `start` until `stop`
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleState {
    /// Next step to schedule (0-15)
    pub cursor: usize,
    pub bpm: f64,
    /// Clock time of the step at `cursor`
    pub next_step_time_s: f64,
    timer: TimerHandle,
    /// First pass runs immediately instead of waiting for a tick
    primed: bool,
}

type StepCallback = Box<dyn FnMut(usize, f64) + Send>;

pub struct RhythmScheduler<T: Timer = IntervalTimer> {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    timer: T,
    state: Option<ScheduleState>,
    pattern: Pattern,
    /// Tempo slot, kept while stopped
    bpm: f64,
    on_step: Option<StepCallback>,
}

impl RhythmScheduler<IntervalTimer> {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_timer(config, clock, IntervalTimer::new())
    }
}

impl<T: Timer> RhythmScheduler<T> {
    pub fn with_timer(config: SchedulerConfig, clock: Arc<dyn Clock>, timer: T) -> Self {
        Self {
            config,
            clock,
            timer,
            state: None,
            pattern: Pattern::empty(),
            bpm: 120.0,
            on_step: None,
        }
    }

    /// Register the step observer.
    ///
    /// It is called with the step index and the clock time in seconds at
    /// which the step sounds. Calls happen when the step is scheduled, up to
    /// one lookahead window early, so displays should wait for that time.
    pub fn on_step<F>(&mut self, callback: F)
    where
        F: FnMut(usize, f64) + Send + 'static,
    {
        self.on_step = Some(Box::new(callback));
    }

    /// Start playing `pattern` at `bpm` from step 0.
    ///
    /// An existing schedule is stopped first.
    pub fn start(&mut self, pattern: Pattern, bpm: f64) -> Result<()> {
        let bpm = self.validate_tempo(bpm)?;
        self.stop();

        self.pattern = pattern;
        self.bpm = bpm;

        let step_ms = step_duration(bpm) * 1000.0;
        let period_ms = self.config.tick_ms.min(step_ms).max(1.0);
        let now_ms = self.clock.now_ms();
        let timer = self.timer.set_interval(period_ms, now_ms);

        self.state = Some(ScheduleState {
            cursor: 0,
            bpm,
            next_step_time_s: now_ms / 1000.0,
            timer,
            primed: false,
        });

        log::info!(
            "Rhythm started: {:.1} BPM, step {:.1}ms, tick {:.1}ms",
            bpm,
            step_ms,
            period_ms
        );
        Ok(())
    }

    /// Stop playing. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if let Some(state) = self.state.take() {
            self.timer.clear_interval(state.timer);
            log::info!("Rhythm stopped at step {}", state.cursor);
        }
    }

    /// Change tempo. A running schedule restarts cleanly from step 0.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        let bpm = self.validate_tempo(bpm)?;
        if self.is_playing() {
            log::info!("Rhythm tempo change: {:.1} -> {:.1} BPM", self.bpm, bpm);
            self.start(self.pattern, bpm)
        } else {
            self.bpm = bpm;
            Ok(())
        }
    }

    /// Replace the pattern. A running schedule keeps its position.
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
    }

    /// Emit triggers for every step due within the lookahead window.
    ///
    /// Returns the number of triggers emitted. Ticks belonging to a cleared
    /// schedule are ignored.
    pub fn poll(&mut self, sink: &mut dyn TriggerSink) -> usize {
        let now_ms = self.clock.now_ms();
        let fired = self.timer.poll(now_ms);

        let Some(state) = self.state.as_mut() else {
            return 0;
        };
        let ticked = fired.contains(&state.timer);
        if !ticked && state.primed {
            return 0;
        }
        state.primed = true;

        let now_s = now_ms / 1000.0;
        let step_s = step_duration(state.bpm);
        let period_s = self.config.tick_ms.min(step_s * 1000.0) / 1000.0;
        let lookahead_s = (self.config.lookahead_ms / 1000.0).max(period_s);

        let bar_s = step_s * STEPS_PER_PATTERN as f64;
        if now_s - state.next_step_time_s > bar_s {
            log::warn!(
                "Rhythm fell {:.0}ms behind, resyncing",
                (now_s - state.next_step_time_s) * 1000.0
            );
            state.next_step_time_s = now_s;
        }

        let mut emitted = 0;
        while state.next_step_time_s < now_s + lookahead_s {
            let step = state.cursor;
            let velocity = if step == 0 {
                self.config.base_velocity * self.config.accent
            } else {
                self.config.base_velocity
            };

            for voice in self.pattern.voices_at(step) {
                sink.trigger(Trigger {
                    voice,
                    time_s: state.next_step_time_s,
                    velocity,
                    step,
                });
                emitted += 1;
            }

            if let Some(callback) = self.on_step.as_mut() {
                callback(step, state.next_step_time_s);
            }

            state.cursor = (step + 1) % STEPS_PER_PATTERN;
            state.next_step_time_s += step_s;
        }

        emitted
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_some()
    }

    /// Current tempo slot
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn state(&self) -> Option<&ScheduleState> {
        self.state.as_ref()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Armed timer intervals
    pub fn active_timers(&self) -> usize {
        self.timer.active_count()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn validate_tempo(&self, bpm: f64) -> Result<f64> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(Error::InvalidTempo(bpm));
        }
        Ok(bpm.clamp(self.config.min_bpm, self.config.max_bpm))
    }
}

impl<T: Timer> Drop for RhythmScheduler<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rhythm::patterns::{get_preset, Voice};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler() -> (RhythmScheduler, ManualClock) {
        let clock = ManualClock::new(0.0);
        let scheduler = RhythmScheduler::new(SchedulerConfig::default(), Arc::new(clock.clone()));
        (scheduler, clock)
    }

    fn kick_every_step() -> Pattern {
        let mut pattern = Pattern::empty();
        for step in 0..STEPS_PER_PATTERN {
            pattern.set(Voice::Kick, step, true).unwrap();
        }
        pattern
    }

    /// Advance the clock in 5ms increments, polling each time
    fn run_for(
        scheduler: &mut RhythmScheduler,
        clock: &ManualClock,
        ms: f64,
        sink: &mut Vec<Trigger>,
    ) {
        let end = clock.now_ms() + ms;
        scheduler.poll(sink);
        while clock.now_ms() < end {
            clock.advance_ms(5.0);
            scheduler.poll(sink);
        }
    }

    #[test]
    fn test_step_interval_at_120_bpm() {
        assert!((step_duration(120.0) - 0.125).abs() < 1e-12);

        let (mut scheduler, clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();

        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 2000.0, &mut hits);

        assert!(hits.len() >= 16);
        for pair in hits.windows(2) {
            let dt = pair[1].time_s - pair[0].time_s;
            assert!((dt - 0.125).abs() < 1e-9, "step interval {}", dt);
        }
    }

    #[test]
    fn test_steps_wrap_and_accent_downbeat() {
        let (mut scheduler, clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();

        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 2500.0, &mut hits);

        let steps: Vec<usize> = hits.iter().map(|t| t.step).collect();
        assert_eq!(&steps[..3], &[0, 1, 2]);
        assert_eq!(steps[16], 0);
        assert!((hits[0].velocity - 1.2).abs() < 1e-6);
        assert!((hits[1].velocity - 1.0).abs() < 1e-6);
        assert!((hits[16].velocity - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_first_step_is_immediate() {
        let (mut scheduler, _clock) = scheduler();
        let pattern = Pattern::from(get_preset("basic").unwrap());
        scheduler.start(pattern, 120.0).unwrap();

        let mut hits = Vec::new();
        scheduler.poll(&mut hits);
        let voices: Vec<Voice> = hits.iter().map(|t| t.voice).collect();
        assert_eq!(voices, vec![Voice::Kick, Voice::HiHat]);
        assert_eq!(hits[0].time_s, 0.0);
    }

    #[test]
    fn test_triggers_scheduled_ahead_of_clock() {
        let (mut scheduler, clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();

        let mut hits = Vec::new();
        for _ in 0..100 {
            let before = hits.len();
            scheduler.poll(&mut hits);
            for hit in &hits[before..] {
                assert!(hit.time_s >= clock.now_secs() - 1e-9);
                assert!(hit.time_s < clock.now_secs() + 0.1 + 1e-9);
            }
            clock.advance_ms(5.0);
        }
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_set_tempo_while_playing_keeps_one_timer() {
        let (mut scheduler, clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();
        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 300.0, &mut hits);

        scheduler.set_tempo(90.0).unwrap();
        assert_eq!(scheduler.active_timers(), 1);
        assert_eq!(scheduler.state().unwrap().cursor, 0);
        assert_eq!(scheduler.bpm(), 90.0);

        scheduler.set_tempo(150.0).unwrap();
        scheduler.set_tempo(150.0).unwrap();
        assert_eq!(scheduler.active_timers(), 1);
    }

    #[test]
    fn test_set_tempo_clamps_and_rejects_nan() {
        let (mut scheduler, _clock) = scheduler();
        scheduler.set_tempo(1000.0).unwrap();
        assert_eq!(scheduler.bpm(), 300.0);
        scheduler.set_tempo(10.0).unwrap();
        assert_eq!(scheduler.bpm(), 30.0);

        assert!(matches!(scheduler.set_tempo(f64::NAN), Err(Error::InvalidTempo(_))));
        assert_eq!(scheduler.bpm(), 30.0);
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_stop_twice_equals_stop_once() {
        let (mut scheduler, clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();

        scheduler.stop();
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.active_timers(), 0);

        scheduler.stop();
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.active_timers(), 0);

        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 500.0, &mut hits);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_stale_timer_tick_is_ignored() {
        let clock = ManualClock::new(0.0);
        let mut timer = IntervalTimer::new();
        timer.set_interval(5.0, 0.0);
        let mut scheduler =
            RhythmScheduler::with_timer(SchedulerConfig::default(), Arc::new(clock.clone()), timer);

        scheduler.start(kick_every_step(), 60.0).unwrap();
        let mut hits = Vec::new();
        scheduler.poll(&mut hits);
        let primed = hits.len();

        // Only the leftover interval is due: nothing new is scheduled
        clock.advance_ms(5.0);
        scheduler.poll(&mut hits);
        assert_eq!(hits.len(), primed);
        assert_eq!(scheduler.active_timers(), 2);

        // Stopping clears only the schedule's own interval
        scheduler.stop();
        assert_eq!(scheduler.active_timers(), 1);
        clock.advance_ms(5.0);
        assert_eq!(scheduler.poll(&mut hits), 0);
    }

    #[test]
    fn test_on_step_observes_each_step() {
        let (mut scheduler, clock) = scheduler();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        scheduler.on_step(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.start(Pattern::empty(), 120.0).unwrap();
        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 1000.0, &mut hits);

        // Empty pattern: steps still advance, nothing sounds
        assert!(hits.is_empty());
        assert!(count.load(Ordering::SeqCst) >= 8);
    }

    #[test]
    fn test_on_step_reports_sounding_time() {
        let (mut scheduler, clock) = scheduler();
        let steps = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = Arc::clone(&steps);
        scheduler.on_step(move |step, time_s| seen.lock().push((step, time_s)));

        scheduler.start(kick_every_step(), 120.0).unwrap();
        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 1000.0, &mut hits);

        let steps = steps.lock();
        assert_eq!(steps.len(), hits.len());
        for ((step, time_s), hit) in steps.iter().zip(&hits) {
            assert_eq!(*step, hit.step);
            assert_eq!(*time_s, hit.time_s);
        }
    }

    #[test]
    fn test_pattern_swap_keeps_position() {
        let (mut scheduler, clock) = scheduler();
        scheduler.start(Pattern::empty(), 120.0).unwrap();
        let mut hits = Vec::new();
        run_for(&mut scheduler, &clock, 400.0, &mut hits);
        let cursor = scheduler.state().unwrap().cursor;

        scheduler.set_pattern(kick_every_step());
        assert_eq!(scheduler.state().unwrap().cursor, cursor);
        run_for(&mut scheduler, &clock, 200.0, &mut hits);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].step, cursor);
    }

    #[test]
    fn test_resync_after_stall() {
        let (mut scheduler, clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();
        let mut hits = Vec::new();
        scheduler.poll(&mut hits);

        // Stall for five seconds: no burst of stale hits
        clock.advance_ms(5000.0);
        hits.clear();
        scheduler.poll(&mut hits);
        assert!(hits.len() <= 2);
        assert!(hits.iter().all(|h| h.time_s >= 5.0 - 1e-9));
    }

    #[test]
    fn test_invalid_start_keeps_schedule() {
        let (mut scheduler, _clock) = scheduler();
        scheduler.start(kick_every_step(), 120.0).unwrap();
        assert!(scheduler.start(kick_every_step(), -5.0).is_err());
        assert!(scheduler.is_playing());
        assert_eq!(scheduler.bpm(), 120.0);
    }
}
