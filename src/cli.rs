//! Command line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use beatkeeper_lib::analysis::StabilityPreset;

/// beatkeeper - live tempo detection with a drum machine that follows you
///
/// Listens to the microphone, detects the tempo you are playing at, and keeps
/// time with a 16-step drum pattern.
#[derive(Parser, Debug)]
#[command(name = "beatkeeper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to a file instead of stderr (default location if no path given)
    #[arg(long, value_name = "PATH", num_args = 0..=1, global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Stability policy for tempo detection
    #[arg(long, value_name = "PRESET", global = true)]
    #[arg(value_parser = ["strict", "balanced", "relaxed"])]
    pub stability: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Detect the tempo from the microphone and play along once it is stable
    Listen {
        /// Input device name (defaults to the system default)
        #[arg(long, value_name = "NAME")]
        device: Option<String>,

        /// Output device name (defaults to the system default)
        #[arg(long, value_name = "NAME")]
        output: Option<String>,

        /// Pattern to play
        #[arg(short, long, value_name = "ID")]
        pattern: Option<String>,

        /// Stop after this many seconds (runs until interrupted otherwise)
        #[arg(short, long, value_name = "N")]
        seconds: Option<f64>,

        /// Only report the tempo; do not start the rhythm automatically
        #[arg(long, default_value = "false")]
        no_auto_start: bool,
    },

    /// Play a pattern at a fixed tempo
    Play {
        /// Tempo in BPM
        #[arg(short, long, value_name = "N")]
        bpm: u32,

        /// Pattern to play ("random" generates a new one)
        #[arg(short, long, value_name = "ID")]
        pattern: Option<String>,

        /// Output device name (defaults to the system default)
        #[arg(long, value_name = "NAME")]
        output: Option<String>,

        /// Stop after this many seconds (runs until interrupted otherwise)
        #[arg(short, long, value_name = "N")]
        seconds: Option<f64>,
    },

    /// Tap the tempo with Enter; q quits
    Tap,

    /// List available patterns as JSON
    Patterns {
        /// Include step grids
        #[arg(long, default_value = "false")]
        steps: bool,
    },

    /// List audio devices as JSON
    Devices,
}

impl Cli {
    /// Selected stability preset, if any
    pub fn stability_preset(&self) -> Option<StabilityPreset> {
        self.stability.as_deref().and_then(|s| s.parse().ok())
    }

    /// Log file to use, if logging to a file was requested
    pub fn log_path(&self) -> Option<PathBuf> {
        match &self.log_file {
            Some(Some(path)) => Some(path.clone()),
            Some(None) => Some(beatkeeper_lib::logging::default_log_path()),
            None => None,
        }
    }
}
