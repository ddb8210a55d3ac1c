//! Tempo analysis
//!
//! Turns microphone frames and user taps into BPM readings:
//! - Low band-pass and frame energy onset detection
//! - Onset-interval beat tracking with outlier rejection
//! - Stability tracking against a floating or fixed reference
//! - Tap tempo

pub mod energy;
pub mod filter;
pub mod stability;
pub mod tap;
pub mod tracker;

pub use energy::{AnalyzerConfig, AudioFrame, EnergyAnalyzer, Observation};
pub use filter::BandPass;
pub use stability::{StabilityConfig, StabilityMonitor, StabilityPreset};
pub use tap::{TapConfig, TapTempo};
pub use tracker::{BeatTracker, OctaveCorrection, OutlierPolicy, TrackerConfig, TrackerState};
