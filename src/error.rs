//! Error types for beatkeeper
//!
//! Only device failures are propagated at runtime. Estimator conditions such as
//! "not enough onsets yet" or "tempo out of range" are modelled as `None` by the
//! analysis components and never reach this type.

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    // =========================================================================
    // Device errors - listening/playback could not start
    // =========================================================================
    #[error("Audio input unavailable: {reason}\n  Tip: Check that a microphone is connected and that this application has permission to use it")]
    InputUnavailable { reason: String },

    #[error("Audio output unavailable: {reason}")]
    OutputUnavailable { reason: String },

    // =========================================================================
    // Caller errors - rejected without changing any state
    // =========================================================================
    #[error("Step index {index} is out of range (patterns have {steps} steps)")]
    StepOutOfRange { index: usize, steps: usize },

    #[error("Unknown voice '{0}' (expected kick, snare or hihat)")]
    UnknownVoice(String),

    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for beatkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an input error from anything displayable
    pub fn input(reason: impl Into<String>) -> Self {
        Error::InputUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an output error from anything displayable
    pub fn output(reason: impl Into<String>) -> Self {
        Error::OutputUnavailable {
            reason: reason.into(),
        }
    }

    /// Returns true if the session can keep running after this error.
    ///
    /// Device failures end listening or playback; everything else was
    /// rejected before any state changed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Error::InputUnavailable { .. } | Error::OutputUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_errors_are_not_recoverable() {
        assert!(!Error::input("permission denied").is_recoverable());
        assert!(!Error::output("no device").is_recoverable());
        assert!(Error::StepOutOfRange { index: 16, steps: 16 }.is_recoverable());
        assert!(Error::InvalidTempo(f64::NAN).is_recoverable());
    }

    #[test]
    fn test_input_error_message() {
        let msg = Error::input("permission denied").to_string();
        assert!(msg.starts_with("Audio input unavailable: permission denied"));
    }
}
