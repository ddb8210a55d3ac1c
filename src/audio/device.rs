//! Audio device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

/// Input and output devices of the default host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceListing {
    pub inputs: Vec<AudioDeviceInfo>,
    pub outputs: Vec<AudioDeviceInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn error(self, reason: String) -> Error {
        match self {
            Direction::Input => Error::input(reason),
            Direction::Output => Error::output(reason),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }

    fn devices(self, host: &cpal::Host) -> Result<Vec<cpal::Device>> {
        let devices: std::result::Result<Vec<cpal::Device>, cpal::DevicesError> = match self {
            Direction::Input => host.input_devices().map(|d| d.collect()),
            Direction::Output => host.output_devices().map(|d| d.collect()),
        };
        devices.map_err(|e| {
            self.error(format!("Failed to enumerate {} devices: {}", self.label(), e))
        })
    }

    fn default_device(self, host: &cpal::Host) -> Option<cpal::Device> {
        match self {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        }
    }
}

fn list(direction: Direction) -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = direction
        .default_device(&host)
        .and_then(|d| d.name().ok());

    Ok(direction
        .devices(&host)?
        .into_iter()
        .filter_map(|device| device.name().ok())
        .map(|name| AudioDeviceInfo {
            is_default: Some(&name) == default_name.as_ref(),
            name,
        })
        .collect())
}

fn find(direction: Direction, name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let Some(wanted) = name else {
        return direction.default_device(&host).ok_or_else(|| {
            direction.error(format!("No default {} device found", direction.label()))
        });
    };

    direction
        .devices(&host)?
        .into_iter()
        .find(|device| device.name().ok().as_deref() == Some(wanted))
        .ok_or_else(|| {
            direction.error(format!("{} device '{}' not found", direction.label(), wanted))
        })
}

/// List all devices on the default host
pub fn list_devices() -> Result<DeviceListing> {
    Ok(DeviceListing {
        inputs: list_input_devices()?,
        outputs: list_output_devices()?,
    })
}

pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>> {
    list(Direction::Input)
}

pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>> {
    list(Direction::Output)
}

/// Input device by name, or the default if `name` is None
pub fn get_input_device(name: Option<&str>) -> Result<cpal::Device> {
    find(Direction::Input, name)
}

/// Output device by name, or the default if `name` is None
pub fn get_output_device(name: Option<&str>) -> Result<cpal::Device> {
    find(Direction::Output, name)
}

/// Input config at the device's native rate and channel count.
/// Capture downmixes to mono, so any layout works.
pub fn get_native_input_config(device: &cpal::Device) -> Result<cpal::StreamConfig> {
    let default_config = device
        .default_input_config()
        .map_err(|e| Error::input(format!("Failed to get default input config: {}", e)))?;
    Ok(default_config.config())
}

/// Output config at the device's native rate, at most two channels
pub fn get_native_output_config(device: &cpal::Device) -> Result<cpal::StreamConfig> {
    let default_config = device
        .default_output_config()
        .map_err(|e| Error::output(format!("Failed to get default output config: {}", e)))?;

    Ok(cpal::StreamConfig {
        channels: default_config.channels().min(2),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    })
}
