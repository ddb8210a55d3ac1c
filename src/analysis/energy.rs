//! Frame energy and onset detection
//!
//! Computes the RMS loudness of each analysis frame and flags abrupt rises
//! against a rolling average of recent frames. By default the energy is
//! measured after a 100 Hz band-pass, so kick drums dominate the reading.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::filter::BandPass;

/// One analysis window of mono samples
#[derive(Debug, Clone, Default)]
pub struct AudioFrame {
    /// Samples, nominally in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate of `samples` in Hz
    pub sample_rate: u32,
    /// Capture time in milliseconds on the session clock
    pub timestamp_ms: f64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, timestamp_ms: f64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp_ms,
        }
    }
}

/// Configuration for `EnergyAnalyzer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Number of recent energies averaged into the baseline
    pub history_len: usize,
    /// Onset fires when energy exceeds baseline times this factor
    pub onset_threshold: f32,
    /// Minimum time between two onsets
    pub refractory_ms: f64,
    /// Frames quieter than this RMS are ignored
    pub noise_floor: f32,
    /// Samples per analysis frame
    pub frame_size: usize,
    /// Centre of the band-pass applied before measuring energy; `None`
    /// measures the raw signal
    pub bandpass_hz: Option<f32>,
    /// Quality factor of the band-pass
    pub bandpass_q: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            history_len: 10,
            onset_threshold: 1.5,
            refractory_ms: 200.0,
            noise_floor: 0.02,
            frame_size: 2048,
            bandpass_hz: Some(100.0),
            bandpass_q: 1.0,
        }
    }
}

/// Result of analysing one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// RMS energy of the frame
    pub energy: f32,
    /// An onset was detected on this frame
    pub onset: bool,
}

/// RMS energy tracker with adaptive-threshold onset detection
pub struct EnergyAnalyzer {
    config: AnalyzerConfig,
    history: VecDeque<f32>,
    previous_energy: f32,
    last_onset_ms: Option<f64>,
    /// Band-pass built for `filter_rate`
    filter: Option<BandPass>,
    filter_rate: u32,
    filtered: Vec<f32>,
}

impl EnergyAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let history = VecDeque::with_capacity(config.history_len.max(1));
        Self {
            config,
            history,
            previous_energy: 0.0,
            last_onset_ms: None,
            filter: None,
            filter_rate: 0,
            filtered: Vec::new(),
        }
    }

    /// Root mean square of the samples, each clamped to [-1, 1]
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples
            .iter()
            .map(|s| {
                let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
                s * s
            })
            .sum();
        (sum / samples.len() as f32).sqrt()
    }

    /// Analyse one frame
    pub fn observe(&mut self, frame: &AudioFrame) -> Observation {
        let energy = self.frame_energy(frame);

        if energy < self.config.noise_floor {
            return Observation {
                energy,
                onset: false,
            };
        }

        self.history.push_back(energy);
        while self.history.len() > self.config.history_len.max(1) {
            self.history.pop_front();
        }

        let baseline = self.baseline();
        let since_last = self
            .last_onset_ms
            .map(|t| frame.timestamp_ms - t)
            .unwrap_or(f64::INFINITY);

        let onset = energy > baseline * self.config.onset_threshold
            && energy > self.previous_energy
            && since_last > self.config.refractory_ms;

        if onset {
            self.last_onset_ms = Some(frame.timestamp_ms);
            log::trace!(
                "onset at {:.0}ms: energy={:.3}, baseline={:.3}",
                frame.timestamp_ms,
                energy,
                baseline
            );
        }

        self.previous_energy = energy;

        Observation { energy, onset }
    }

    /// RMS of the frame, band-passed when configured
    fn frame_energy(&mut self, frame: &AudioFrame) -> f32 {
        let Some(center) = self.config.bandpass_hz else {
            return Self::rms(&frame.samples);
        };

        if self.filter_rate != frame.sample_rate {
            self.filter_rate = frame.sample_rate;
            self.filter = BandPass::new(center, self.config.bandpass_q, frame.sample_rate);
            if self.filter.is_none() {
                log::warn!(
                    "No {} Hz band-pass at {} Hz, measuring unfiltered energy",
                    center,
                    frame.sample_rate
                );
            }
        }

        match &self.filter {
            Some(filter) => {
                filter.process(&frame.samples, &mut self.filtered);
                Self::rms(&self.filtered)
            }
            None => Self::rms(&frame.samples),
        }
    }

    /// Running average of the energy history
    pub fn baseline(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f32>() / self.history.len() as f32
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.history.clear();
        self.previous_energy = 0.0;
        self.last_onset_ms = None;
    }
}
