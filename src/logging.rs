//! Logger setup for the command line binary
//!
//! Logs go to stderr by default. With a log file they are appended there
//! instead, each line stamped with local time.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Default log file location (platform data directory)
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("beatkeeper")
        .join("logs")
        .join("beatkeeper.log")
}

/// Filter used when `RUST_LOG` is not set
pub fn level_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize logging.
///
/// `RUST_LOG` overrides the level picked from `verbosity`. Returns the log
/// file path if one is in use.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<PathBuf>> {
    let env = env_logger::Env::default().default_filter_or(level_filter(verbosity));
    let mut builder = env_logger::Builder::from_env(env);

    let Some(path) = log_file else {
        builder.format_timestamp_millis();
        // A logger may already be installed (tests)
        let _ = builder.try_init();
        return Ok(None);
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    builder
        .format(|buf, record| {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                timestamp,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(file)));
    let _ = builder.try_init();

    log::info!("beatkeeper {} started", env!("CARGO_PKG_VERSION"));
    Ok(Some(path.to_path_buf()))
}
