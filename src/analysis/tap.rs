//! Manual tap tempo
//!
//! Keeps the last few tap timestamps and reports the BPM implied by their mean
//! spacing. A long pause starts a new tap sequence.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Configuration for `TapTempo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Number of taps retained
    pub max_taps: usize,
    /// A gap longer than this discards earlier taps
    pub reset_after_ms: f64,
    /// Lowest reported tempo
    pub min_bpm: u32,
    /// Highest reported tempo
    pub max_bpm: u32,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            max_taps: 4,
            reset_after_ms: 2000.0,
            min_bpm: 30,
            max_bpm: 300,
        }
    }
}

pub struct TapTempo {
    config: TapConfig,
    taps: VecDeque<f64>,
}

impl TapTempo {
    pub fn new(config: TapConfig) -> Self {
        Self {
            taps: VecDeque::with_capacity(config.max_taps.max(2)),
            config,
        }
    }

    /// Register a tap. Returns the tempo once at least two taps are held.
    pub fn tap(&mut self, timestamp_ms: f64) -> Option<u32> {
        if let Some(&last) = self.taps.back() {
            let gap = timestamp_ms - last;
            if gap > self.config.reset_after_ms || gap < 0.0 {
                log::debug!("Tap tempo: {:.0}ms gap, starting a new sequence", gap);
                self.taps.clear();
            }
        }

        self.taps.push_back(timestamp_ms);
        while self.taps.len() > self.config.max_taps.max(2) {
            self.taps.pop_front();
        }

        self.bpm()
    }

    /// Tempo implied by the held taps, if inside the configured range
    pub fn bpm(&self) -> Option<u32> {
        if self.taps.len() < 2 {
            return None;
        }

        let (first, last) = (self.taps.front()?, self.taps.back()?);
        let mean_interval = (last - first) / (self.taps.len() - 1) as f64;
        if mean_interval <= 0.0 {
            return None;
        }

        let bpm = (60000.0 / mean_interval).round();
        if bpm < self.config.min_bpm as f64 || bpm > self.config.max_bpm as f64 {
            return None;
        }
        Some(bpm as u32)
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(TapConfig::default())
    }
}
