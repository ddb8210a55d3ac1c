//! Drum output using cpal for real-time audio playback
//!
//! The audio callback drains the trigger queue and starts each hit at the
//! sample offset matching its scheduled time. Hits that are already late
//! start immediately.

use cpal::traits::{DeviceTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::device::{get_native_output_config, get_output_device};
use super::voices::DrumSynth;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::rhythm::{Trigger, TriggerQueue};

/// Initial capacity of the callback's drain buffer
const DRAIN_CAPACITY: usize = 256;

/// Sample offset of `time_s` relative to `now_s`, zero if already due
pub fn trigger_offset(time_s: f64, now_s: f64, sample_rate: u32) -> usize {
    let ahead = time_s - now_s;
    if ahead <= 0.0 || !ahead.is_finite() {
        return 0;
    }
    (ahead * sample_rate as f64).round() as usize
}

/// Output stream rendering scheduled drum hits
pub struct OutputEngine {
    _stream: cpal::Stream,
    played: Arc<AtomicU64>,
    device_name: String,
    sample_rate: u32,
}

impl OutputEngine {
    /// Open an output device and start rendering triggers from `queue`
    pub fn start(
        device_name: Option<&str>,
        clock: Arc<dyn Clock>,
        queue: Arc<TriggerQueue>,
    ) -> Result<Self> {
        let device = get_output_device(device_name)?;
        let device_name_str = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let stream_config = get_native_output_config(&device)?;

        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels.max(1) as usize;

        log::info!(
            "Starting drum output on {}: {} Hz, {} channels",
            device_name_str,
            sample_rate,
            channels
        );

        let mut synth = DrumSynth::new(sample_rate);
        let mut pending: Vec<Trigger> = Vec::with_capacity(DRAIN_CAPACITY);
        let played = Arc::new(AtomicU64::new(0));
        let played_clone = Arc::clone(&played);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let now_s = clock.now_secs();
                    let count = queue.drain_into(&mut pending);
                    for trigger in &pending {
                        let offset = trigger_offset(trigger.time_s, now_s, sample_rate);
                        synth.trigger(trigger.voice, trigger.velocity, offset);
                    }
                    if count > 0 {
                        played_clone.fetch_add(count as u64, Ordering::Relaxed);
                    }
                    synth.render(data, channels);
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None, // No timeout
            )
            .map_err(|e| Error::output(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::output(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            played,
            device_name: device_name_str,
            sample_rate,
        })
    }

    /// Hits handed to the synthesizer so far
    pub fn hits_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for OutputEngine {
    fn drop(&mut self) {
        log::info!("Drum output stopped: {}", self.device_name);
    }
}
