//! beatkeeper - live tempo detection and drum pattern playback
//!
//! Listens to a microphone, estimates the tempo from energy onsets, lets the
//! user confirm or override it by tapping, and plays a 16-step drum pattern in
//! time with it.

pub mod analysis;
pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod rhythm;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{NullObserver, Session, SessionObserver};
