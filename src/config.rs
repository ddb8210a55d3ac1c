//! Runtime configuration
//!
//! Every component has its own config struct with documented defaults. They
//! are gathered here and can be loaded from a JSON file, where any omitted
//! field keeps its default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analysis::{AnalyzerConfig, OutlierPolicy, StabilityPreset, TapConfig, TrackerConfig};
use crate::error::{Error, Result};
use crate::rhythm::{RandomDensity, SchedulerConfig};

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start the rhythm automatically once the detected tempo is stable
    pub auto_start_on_stable: bool,
    /// Tempo used before anything is detected or tapped
    pub default_bpm: u32,
    /// Pattern selected at startup
    pub initial_pattern: String,
    /// Capacity of the queue between scheduler and audio output
    pub trigger_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_start_on_stable: true,
            default_bpm: 120,
            initial_pattern: "basic".to_string(),
            trigger_queue_capacity: 1024,
        }
    }
}

/// All tunables
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analyzer: AnalyzerConfig,
    pub tracker: TrackerConfig,
    pub tap: TapConfig,
    pub scheduler: SchedulerConfig,
    pub random: RandomDensity,
    pub session: SessionConfig,
}

impl Config {
    /// Load from a JSON file and validate
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply a named stability policy to the tracker
    pub fn apply_stability_preset(&mut self, preset: StabilityPreset) {
        self.tracker.stability = preset.config();
    }

    /// Reject inconsistent values. Lookahead shorter than the tick period is
    /// raised to the tick period.
    pub fn validate(&mut self) -> Result<()> {
        let a = &self.analyzer;
        if a.history_len == 0 || a.frame_size == 0 {
            return Err(Error::Config("analyzer history and frame size must be non-zero".into()));
        }
        if !(a.onset_threshold > 0.0) || !(a.noise_floor >= 0.0) || !(a.refractory_ms >= 0.0) {
            return Err(Error::Config("analyzer threshold, noise floor and refractory period must be positive".into()));
        }
        if let Some(hz) = a.bandpass_hz {
            if !(hz > 0.0) || !(a.bandpass_q > 0.0) {
                return Err(Error::Config(format!(
                    "band-pass {} Hz with Q {} is invalid",
                    hz, a.bandpass_q
                )));
            }
        }

        let t = &self.tracker;
        if t.interval_capacity < 2 || t.bpm_history_capacity == 0 {
            return Err(Error::Config("tracker needs room for at least two intervals".into()));
        }
        if t.min_bpm == 0 || t.min_bpm > t.max_bpm {
            return Err(Error::Config(format!(
                "tracker BPM range [{}, {}] is invalid",
                t.min_bpm, t.max_bpm
            )));
        }
        if t.octave_correction.double_below > t.octave_correction.halve_above {
            return Err(Error::Config("octave correction thresholds are reversed".into()));
        }
        if !(t.stability.tolerance > 0.0 && t.stability.tolerance <= 1.0) {
            return Err(Error::Config(format!(
                "stability tolerance {} must be in (0, 1]",
                t.stability.tolerance
            )));
        }
        if t.stability.measures == 0 {
            return Err(Error::Config("stability needs at least one measure".into()));
        }
        match t.outlier_policy {
            OutlierPolicy::Iqr { k } if !(k >= 0.0) => {
                return Err(Error::Config("IQR multiplier must be non-negative".into()));
            }
            OutlierPolicy::MeanDeviation { fraction } if !(fraction > 0.0) => {
                return Err(Error::Config("mean deviation fraction must be positive".into()));
            }
            _ => {}
        }
        if !(t.silence_timeout_ms > 0.0) || !(t.weight_base >= 1.0) {
            return Err(Error::Config("silence timeout must be positive and weight base at least 1".into()));
        }

        let tap = &self.tap;
        if tap.max_taps < 2 || tap.min_bpm == 0 || tap.min_bpm > tap.max_bpm {
            return Err(Error::Config("tap tempo needs two taps and a valid BPM range".into()));
        }

        let s = &mut self.scheduler;
        if !(s.tick_ms > 0.0) || !(s.min_bpm > 0.0) || s.min_bpm > s.max_bpm {
            return Err(Error::Config("scheduler tick and tempo bounds must be positive".into()));
        }
        if !(s.accent > 0.0) || !(s.base_velocity > 0.0) {
            return Err(Error::Config("accent and base velocity must be positive".into()));
        }
        if !(s.lookahead_ms >= s.tick_ms) {
            log::warn!(
                "Lookahead {}ms is shorter than the tick period, using {}ms",
                s.lookahead_ms,
                s.tick_ms
            );
            s.lookahead_ms = s.tick_ms;
        }

        for p in [self.random.kick, self.random.snare, self.random.hihat] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("random density {} must be in [0, 1]", p)));
            }
        }

        if self.session.trigger_queue_capacity == 0 {
            return Err(Error::Config("trigger queue capacity must be non-zero".into()));
        }

        Ok(())
    }
}
