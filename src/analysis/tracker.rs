//! Beat tracking from onset timestamps
//!
//! Converts inter-onset intervals into a BPM estimate:
//! - bounded interval history with a refractory guard
//! - outlier rejection (IQR by default)
//! - octave correction for half/double tempo misreads
//! - exponentially weighted BPM history
//! - stability detection and silence reset

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::stability::{StabilityConfig, StabilityMonitor};

/// How intervals that disagree with the rest are discarded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Keep values inside `[Q1 - k*IQR, Q3 + k*IQR]`
    Iqr { k: f64 },
    /// Keep values whose distance from the mean is below `fraction * mean`
    MeanDeviation { fraction: f64 },
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        OutlierPolicy::Iqr { k: 1.5 }
    }
}

impl OutlierPolicy {
    /// Return the intervals that survive this policy
    pub fn filter(&self, intervals: &[f64]) -> Vec<f64> {
        if intervals.is_empty() {
            return Vec::new();
        }
        match *self {
            OutlierPolicy::Iqr { k } => {
                let mut sorted = intervals.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let n = sorted.len();
                let q1 = sorted[n / 4];
                let q3 = sorted[(n * 3) / 4];
                let iqr = q3 - q1;
                let lower = q1 - k * iqr;
                let upper = q3 + k * iqr;
                sorted
                    .into_iter()
                    .filter(|&i| i >= lower && i <= upper)
                    .collect()
            }
            OutlierPolicy::MeanDeviation { fraction } => {
                let mean = mean(intervals);
                intervals
                    .iter()
                    .copied()
                    .filter(|&i| (i - mean).abs() < mean * fraction)
                    .collect()
            }
        }
    }
}

/// Half/double tempo correction thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctaveCorrection {
    /// Readings below this are doubled
    pub double_below: u32,
    /// Readings above this are halved
    pub halve_above: u32,
}

impl Default for OctaveCorrection {
    fn default() -> Self {
        Self {
            double_below: 60,
            halve_above: 200,
        }
    }
}

impl OctaveCorrection {
    pub fn apply(&self, bpm: u32) -> u32 {
        let mut bpm = bpm;
        if bpm < self.double_below {
            bpm *= 2;
        }
        if bpm > self.halve_above {
            bpm = (bpm as f64 / 2.0).round() as u32;
        }
        bpm
    }
}

/// Configuration for `BeatTracker`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Onsets closer than this to the last accepted one are dropped
    pub refractory_ms: f64,
    /// Maximum stored intervals
    pub interval_capacity: usize,
    /// Maximum stored BPM readings
    pub bpm_history_capacity: usize,
    /// Intervals needed before an estimate is attempted
    pub min_intervals: usize,
    pub outlier_policy: OutlierPolicy,
    pub octave_correction: OctaveCorrection,
    /// Lowest BPM that is published
    pub min_bpm: u32,
    /// Highest BPM that is published
    pub max_bpm: u32,
    pub stability: StabilityConfig,
    /// Without onsets for this long the tracker returns to idle
    pub silence_timeout_ms: f64,
    /// Weight base of the BPM history average (newest weight = 1)
    pub weight_base: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refractory_ms: 100.0,
            interval_capacity: 16,
            bpm_history_capacity: 16,
            min_intervals: 2,
            outlier_policy: OutlierPolicy::default(),
            octave_correction: OctaveCorrection::default(),
            min_bpm: 40,
            max_bpm: 220,
            stability: StabilityConfig::default(),
            silence_timeout_ms: 2000.0,
            weight_base: 1.5,
        }
    }
}

/// Where the tracker is in its estimation cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// No recent onsets
    Idle,
    /// Onsets seen, not enough intervals for a reading
    Accumulating,
    /// Publishing readings
    Estimating,
    /// Readings held steady for the configured number of measures
    Stable,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Estimate BPM from a set of intervals (milliseconds).
///
/// Returns `None` if fewer than two intervals survive outlier rejection, or if
/// the octave-corrected result is outside the configured range.
pub fn estimate_bpm(intervals: &[f64], config: &TrackerConfig) -> Option<u32> {
    let clean = config.outlier_policy.filter(intervals);
    if clean.len() < 2 {
        return None;
    }

    let avg_interval = mean(&clean);
    if avg_interval <= 0.0 {
        return None;
    }

    let raw = (60000.0 / avg_interval).round();
    if !raw.is_finite() || raw > u32::MAX as f64 {
        return None;
    }
    let bpm = config.octave_correction.apply(raw as u32);

    if bpm >= config.min_bpm && bpm <= config.max_bpm {
        Some(bpm)
    } else {
        None
    }
}

/// Weighted average favouring recent readings: weight(i) = base^(i - n + 1)
pub fn weighted_average(history: &[u32], base: f64) -> Option<u32> {
    if history.is_empty() {
        return None;
    }
    let n = history.len() as i32;
    let mut total = 0.0;
    let mut total_weight = 0.0;
    for (i, &bpm) in history.iter().enumerate() {
        let weight = base.powi(i as i32 - n + 1);
        total += bpm as f64 * weight;
        total_weight += weight;
    }
    Some((total / total_weight).round() as u32)
}

/// Onset-driven tempo estimator
pub struct BeatTracker {
    config: TrackerConfig,
    last_onset_ms: Option<f64>,
    onsets_seen: usize,
    intervals: VecDeque<f64>,
    bpm_history: VecDeque<u32>,
    last_bpm: Option<u32>,
    stability: StabilityMonitor,
    state: TrackerState,
}

impl BeatTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let stability = StabilityMonitor::new(config.stability);
        Self {
            intervals: VecDeque::with_capacity(config.interval_capacity),
            bpm_history: VecDeque::with_capacity(config.bpm_history_capacity),
            config,
            last_onset_ms: None,
            onsets_seen: 0,
            last_bpm: None,
            stability,
            state: TrackerState::Idle,
        }
    }

    /// Record an onset at `timestamp_ms`.
    ///
    /// Returns the BPM reading published by this onset, if any.
    pub fn record_onset(&mut self, timestamp_ms: f64) -> Option<u32> {
        if let Some(last) = self.last_onset_ms {
            let gap = timestamp_ms - last;
            if gap > self.config.silence_timeout_ms {
                log::debug!("Beat tracker: {:.0}ms since last onset, starting over", gap);
                self.reset();
            } else if gap < self.config.refractory_ms {
                log::trace!("Beat tracker: onset {:.0}ms after previous ignored", gap);
                return None;
            }
        }

        let previous = self.last_onset_ms.replace(timestamp_ms);
        self.onsets_seen += 1;

        let Some(previous) = previous else {
            self.set_state(TrackerState::Accumulating);
            return None;
        };

        self.intervals.push_back(timestamp_ms - previous);
        while self.intervals.len() > self.config.interval_capacity.max(1) {
            self.intervals.pop_front();
        }

        if self.intervals.len() < self.config.min_intervals.max(2) {
            if self.state == TrackerState::Idle {
                self.set_state(TrackerState::Accumulating);
            }
            return None;
        }

        let intervals: Vec<f64> = self.intervals.iter().copied().collect();
        let bpm = estimate_bpm(&intervals, &self.config)?;

        self.bpm_history.push_back(bpm);
        while self.bpm_history.len() > self.config.bpm_history_capacity.max(1) {
            self.bpm_history.pop_front();
        }
        self.last_bpm = Some(bpm);

        if self.stability.observe(bpm) {
            self.set_state(TrackerState::Stable);
        } else {
            self.set_state(TrackerState::Estimating);
        }

        Some(bpm)
    }

    /// Return to idle if no onset arrived within the silence timeout.
    ///
    /// Returns true if this call reset the tracker.
    pub fn check_silence(&mut self, now_ms: f64) -> bool {
        match self.last_onset_ms {
            Some(last) if now_ms - last > self.config.silence_timeout_ms => {
                log::debug!("Beat tracker: silence timeout");
                self.reset();
                true
            }
            _ => false,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.stability.is_stable()
    }

    /// Weighted mean of the BPM history
    pub fn stable_bpm(&self) -> Option<u32> {
        let history: Vec<u32> = self.bpm_history.iter().copied().collect();
        weighted_average(&history, self.config.weight_base)
    }

    /// The most recently published reading
    pub fn last_bpm(&self) -> Option<u32> {
        self.last_bpm
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn intervals(&self) -> impl Iterator<Item = f64> + '_ {
        self.intervals.iter().copied()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn bpm_history_len(&self) -> usize {
        self.bpm_history.len()
    }

    /// Number of onsets accepted since the last reset
    pub fn onsets_seen(&self) -> usize {
        self.onsets_seen
    }

    pub fn stability(&self) -> &StabilityMonitor {
        &self.stability
    }

    /// Pin the stability reference to a fixed tempo (or release it).
    ///
    /// While pinned, `is_stable()` reports whether the live readings agree with
    /// the fixed tempo.
    pub fn lock_reference(&mut self, bpm: Option<u32>) {
        self.stability.lock_reference(bpm);
        if matches!(self.state, TrackerState::Stable) {
            self.set_state(TrackerState::Estimating);
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Clear all histories and counters. A pinned reference is kept.
    pub fn reset(&mut self) {
        self.last_onset_ms = None;
        self.onsets_seen = 0;
        self.intervals.clear();
        self.bpm_history.clear();
        self.last_bpm = None;
        self.stability.reset();
        self.set_state(TrackerState::Idle);
    }

    fn set_state(&mut self, state: TrackerState) {
        if self.state != state {
            log::debug!("Beat tracker: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut BeatTracker, times: &[f64]) -> Vec<Option<u32>> {
        times.iter().map(|&t| tracker.record_onset(t)).collect()
    }

    fn times_from_intervals(intervals: &[f64]) -> Vec<f64> {
        let mut t = 1000.0;
        let mut times = vec![t];
        for &i in intervals {
            t += i;
            times.push(t);
        }
        times
    }

    #[test]
    fn test_iqr_filter_drops_double_gap() {
        let kept = OutlierPolicy::default().filter(&[500.0, 500.0, 500.0, 2000.0, 500.0]);
        assert_eq!(kept, vec![500.0; 4]);
    }

    #[test]
    fn test_mean_deviation_filter() {
        let policy = OutlierPolicy::MeanDeviation { fraction: 0.5 };
        // Mean is 800, so 2000 deviates by 1200 > 400
        let kept = policy.filter(&[500.0, 500.0, 500.0, 2000.0, 500.0]);
        assert_eq!(kept, vec![500.0; 4]);
    }

    #[test]
    fn test_outlier_rejected_estimate() {
        let config = TrackerConfig::default();
        assert_eq!(
            estimate_bpm(&[500.0, 500.0, 500.0, 2000.0, 500.0], &config),
            Some(120)
        );
    }

    #[test]
    fn test_outlier_rejected_through_onsets() {
        let mut tracker = BeatTracker::new(TrackerConfig {
            silence_timeout_ms: 5000.0,
            ..TrackerConfig::default()
        });
        let times = times_from_intervals(&[500.0, 500.0, 500.0, 2000.0, 500.0]);
        let readings = feed(&mut tracker, &times);
        assert_eq!(readings.last().copied().flatten(), Some(120));
    }

    #[test]
    fn test_octave_correction() {
        let correction = OctaveCorrection::default();
        assert_eq!(correction.apply(55), 110);
        assert_eq!(correction.apply(210), 105);
        assert_eq!(correction.apply(120), 120);
        assert_eq!(correction.apply(60), 60);
        assert_eq!(correction.apply(200), 200);
    }

    #[test]
    fn test_octave_correction_in_estimate() {
        let config = TrackerConfig::default();
        // ~1091ms intervals -> 55 BPM -> reported as 110
        assert_eq!(estimate_bpm(&[1091.0, 1091.0, 1091.0], &config), Some(110));
        // ~286ms intervals -> 210 BPM -> reported as 105
        assert_eq!(estimate_bpm(&[285.7, 285.7, 285.7], &config), Some(105));
    }

    #[test]
    fn test_out_of_range_is_discarded() {
        let config = TrackerConfig {
            min_bpm: 100,
            ..TrackerConfig::default()
        };
        // 90 BPM survives correction but is below the configured floor
        assert_eq!(estimate_bpm(&[666.7, 666.7, 666.7], &config), None);
    }

    #[test]
    fn test_insufficient_intervals() {
        let config = TrackerConfig::default();
        assert_eq!(estimate_bpm(&[], &config), None);
        assert_eq!(estimate_bpm(&[500.0], &config), None);
    }

    #[test]
    fn test_refractory_collapses_double_trigger() {
        let mut tracker = BeatTracker::new(TrackerConfig {
            refractory_ms: 200.0,
            ..TrackerConfig::default()
        });
        tracker.record_onset(1000.0);
        tracker.record_onset(1050.0);
        assert_eq!(tracker.onsets_seen(), 1);
        assert_eq!(tracker.interval_count(), 0);
    }

    #[test]
    fn test_state_progression() {
        let mut tracker = BeatTracker::new(TrackerConfig::default());
        assert_eq!(tracker.state(), TrackerState::Idle);

        assert_eq!(tracker.record_onset(0.0), None);
        assert_eq!(tracker.state(), TrackerState::Accumulating);

        assert_eq!(tracker.record_onset(500.0), None);
        assert_eq!(tracker.state(), TrackerState::Accumulating);

        assert_eq!(tracker.record_onset(1000.0), Some(120));
        assert_eq!(tracker.state(), TrackerState::Estimating);

        for i in 3..6 {
            tracker.record_onset(i as f64 * 500.0);
        }
        assert_eq!(tracker.state(), TrackerState::Stable);
        assert!(tracker.is_stable());
    }

    #[test]
    fn test_convergence_with_jitter() {
        let true_interval = 500.0;
        let jitter = [0.08, -0.06, 0.04, -0.09, 0.1, -0.05, 0.02, -0.04, 0.07, -0.07];
        let intervals: Vec<f64> = jitter.iter().map(|j| true_interval * (1.0 + j)).collect();

        let mut tracker = BeatTracker::new(TrackerConfig::default());
        let readings = feed(&mut tracker, &times_from_intervals(&intervals));

        let expected = (60000.0_f64 / true_interval).round() as i64;
        // From the fourth onset on, every reading is within ±2 BPM
        for reading in readings.iter().skip(3) {
            let bpm = reading.expect("reading after four onsets") as i64;
            assert!((bpm - expected).abs() <= 2, "got {} expected {}", bpm, expected);
        }
        let smoothed = tracker.stable_bpm().unwrap() as i64;
        assert!((smoothed - expected).abs() <= 2);
    }

    #[test]
    fn test_tempo_change_drops_to_estimating() {
        let mut tracker = BeatTracker::new(TrackerConfig {
            interval_capacity: 4,
            ..TrackerConfig::default()
        });
        let mut t = 0.0;
        for _ in 0..8 {
            tracker.record_onset(t);
            t += 500.0;
        }
        assert_eq!(tracker.state(), TrackerState::Stable);

        // Faster playing: once it dominates the window the reading jumps away
        let mut left_stable = false;
        for _ in 0..6 {
            tracker.record_onset(t);
            t += 300.0;
            if tracker.state() == TrackerState::Estimating {
                left_stable = true;
                break;
            }
        }
        assert!(left_stable);
        assert_eq!(tracker.stability().counter(), 0);
    }

    #[test]
    fn test_histories_are_bounded() {
        let config = TrackerConfig {
            interval_capacity: 8,
            bpm_history_capacity: 8,
            ..TrackerConfig::default()
        };
        let mut tracker = BeatTracker::new(config);
        for i in 0..40 {
            tracker.record_onset(i as f64 * 480.0);
            assert!(tracker.interval_count() <= 8);
            assert!(tracker.bpm_history_len() <= 8);
        }
        assert_eq!(tracker.interval_count(), 8);
        assert_eq!(tracker.stable_bpm(), Some(125));
    }

    #[test]
    fn test_silence_timeout_resets() {
        let mut tracker = BeatTracker::new(TrackerConfig::default());
        feed(&mut tracker, &[0.0, 500.0, 1000.0, 1500.0]);
        assert!(tracker.last_bpm().is_some());

        assert!(!tracker.check_silence(3000.0));
        assert!(tracker.check_silence(3600.0));
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.interval_count(), 0);
        assert_eq!(tracker.stable_bpm(), None);

        // Second call is a no-op
        assert!(!tracker.check_silence(9000.0));
    }

    #[test]
    fn test_long_gap_starts_new_session() {
        let mut tracker = BeatTracker::new(TrackerConfig::default());
        feed(&mut tracker, &[0.0, 500.0, 1000.0]);
        tracker.record_onset(5000.0);
        assert_eq!(tracker.onsets_seen(), 1);
        assert_eq!(tracker.interval_count(), 0);
        assert_eq!(tracker.state(), TrackerState::Accumulating);
    }

    #[test]
    fn test_weighted_average_favours_recent() {
        assert_eq!(weighted_average(&[], 1.5), None);
        assert_eq!(weighted_average(&[120], 1.5), Some(120));
        // weights 1/1.5 and 1: (100*0.667 + 130) / 1.667 = 118
        assert_eq!(weighted_average(&[100, 130], 1.5), Some(118));
    }

    #[test]
    fn test_locked_reference() {
        let mut tracker = BeatTracker::new(TrackerConfig::default());
        tracker.lock_reference(Some(100));
        let mut t = 0.0;
        for _ in 0..8 {
            tracker.record_onset(t);
            t += 500.0;
        }
        // Steady 120 BPM is not consistent with a fixed 100 BPM
        assert!(!tracker.is_stable());

        tracker.lock_reference(Some(120));
        for _ in 0..4 {
            tracker.record_onset(t);
            t += 500.0;
        }
        assert!(tracker.is_stable());
    }
}
