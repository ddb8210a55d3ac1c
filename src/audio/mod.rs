//! Audio devices for listening and playback
//!
//! Provides:
//! - Device enumeration
//! - Microphone capture into analysis frames
//! - Drum synthesis and the output stream that plays scheduled hits

pub mod device;
pub mod engine;
pub mod input;
pub mod voices;

pub use device::{list_devices, AudioDeviceInfo, DeviceListing};
pub use engine::OutputEngine;
pub use input::{FrameSource, FrameWindow, InputCapture};
