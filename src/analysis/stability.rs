//! Tempo stability tracking
//!
//! Counts consecutive BPM readings that stay within a relative tolerance of a
//! reference. The reference either floats (it follows the last in-band
//! reading) or is pinned to a user-fixed tempo.

use serde::{Deserialize, Serialize};

/// Tolerance band and the number of consecutive in-band readings required
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Allowed relative deviation from the reference (0.15 = ±15%)
    pub tolerance: f64,
    /// Consecutive in-band readings needed to call the tempo stable
    pub measures: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityPreset::Balanced.config()
    }
}

/// Named stability policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityPreset {
    /// ±10% held for 8 readings
    Strict,
    /// ±15% held for 3 readings
    Balanced,
    /// ±30% held for 2 readings
    Relaxed,
}

impl StabilityPreset {
    pub fn config(self) -> StabilityConfig {
        let (tolerance, measures) = match self {
            StabilityPreset::Strict => (0.10, 8),
            StabilityPreset::Balanced => (0.15, 3),
            StabilityPreset::Relaxed => (0.30, 2),
        };
        StabilityConfig {
            tolerance,
            measures,
        }
    }
}

impl std::str::FromStr for StabilityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(StabilityPreset::Strict),
            "balanced" => Ok(StabilityPreset::Balanced),
            "relaxed" => Ok(StabilityPreset::Relaxed),
            other => Err(format!("unknown stability preset: {}", other)),
        }
    }
}

/// Consecutive-reading stability counter.
///
/// `counter > 0` always implies a reference is set.
#[derive(Debug, Clone)]
pub struct StabilityMonitor {
    config: StabilityConfig,
    reference: Option<u32>,
    /// Pinned reference (user-fixed tempo); never replaced by readings
    fixed: Option<u32>,
    counter: u32,
}

impl StabilityMonitor {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            reference: None,
            fixed: None,
            counter: 0,
        }
    }

    /// Feed one BPM reading. Returns true if the tempo is stable afterwards.
    pub fn observe(&mut self, bpm: u32) -> bool {
        match self.reference {
            Some(reference) if self.within_tolerance(bpm, reference) => {
                self.counter = self.counter.saturating_add(1);
                if self.fixed.is_none() {
                    self.reference = Some(bpm);
                }
            }
            Some(_) => {
                self.counter = 0;
                if self.fixed.is_none() {
                    self.reference = Some(bpm);
                }
            }
            None => {
                self.reference = Some(bpm);
                self.counter = 0;
            }
        }
        self.is_stable()
    }

    /// Pin the reference to a fixed tempo, or release it with `None`.
    /// Either way the counter restarts.
    pub fn lock_reference(&mut self, bpm: Option<u32>) {
        self.fixed = bpm;
        self.reference = bpm;
        self.counter = 0;
    }

    pub fn is_stable(&self) -> bool {
        self.reference.is_some() && self.counter >= self.config.measures
    }

    pub fn reference(&self) -> Option<u32> {
        self.reference
    }

    pub fn fixed_reference(&self) -> Option<u32> {
        self.fixed
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn config(&self) -> StabilityConfig {
        self.config
    }

    /// Clear the counter and any floating reference. A pinned reference survives.
    pub fn reset(&mut self) {
        self.reference = self.fixed;
        self.counter = 0;
    }

    fn within_tolerance(&self, bpm: u32, reference: u32) -> bool {
        if reference == 0 {
            return false;
        }
        let deviation = (bpm as f64 - reference as f64).abs() / reference as f64;
        deviation <= self.config.tolerance
    }
}
