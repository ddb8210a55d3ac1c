//! Live audio input capture using cpal
//!
//! Captures audio from an input device (microphone, audio interface), mixes it
//! to mono and hands it to the analyzer through a lock-free ring buffer. The
//! reader keeps a sliding window of the most recent samples and serves it as
//! an `AudioFrame`.

use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::RwLock;
use ringbuf::{traits::*, HeapRb};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::device::{get_input_device, get_native_input_config};
use crate::analysis::AudioFrame;
use crate::clock::Clock;
use crate::error::{Error, Result};

/// Pull-based source of analysis frames
pub trait FrameSource {
    /// The latest frame, `Ok(None)` if no new samples arrived since the last
    /// call, or an error if the device failed.
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;
}

/// Sliding window over the most recent mono samples
#[derive(Debug, Clone)]
pub struct FrameWindow {
    samples: VecDeque<f32>,
    size: usize,
    sample_rate: u32,
}

impl FrameWindow {
    pub fn new(size: usize, sample_rate: u32) -> Self {
        let size = size.max(1);
        Self {
            samples: VecDeque::with_capacity(size),
            size,
            sample_rate,
        }
    }

    /// Append samples, discarding the oldest beyond the window size
    pub fn push(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.size);
        self.samples.extend(&samples[skip..]);
        while self.samples.len() > self.size {
            self.samples.pop_front();
        }
    }

    /// Snapshot of the window. Until it has filled, the frame is shorter.
    pub fn frame(&self, timestamp_ms: f64) -> AudioFrame {
        AudioFrame::new(
            self.samples.iter().copied().collect(),
            self.sample_rate,
            timestamp_ms,
        )
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Shared state between input stream and reader
struct InputSharedState {
    /// Whether the input stream is active
    is_active: AtomicBool,
    /// Set from the stream error callback
    error: RwLock<Option<String>>,
}

/// Microphone capture.
///
/// Dropping it stops the stream.
pub struct InputCapture {
    _stream: cpal::Stream,
    /// Ring buffer consumer (read side)
    consumer: ringbuf::HeapCons<f32>,
    shared: Arc<InputSharedState>,
    window: FrameWindow,
    scratch: Vec<f32>,
    clock: Arc<dyn Clock>,
    device_name: String,
    sample_rate: u32,
}

impl InputCapture {
    /// Open an input device and start capturing.
    ///
    /// # Arguments
    /// * `device_name` - Name of the input device, or None for system default
    /// * `frame_size` - Samples per analysis frame
    /// * `clock` - Clock used to timestamp frames
    ///
    /// Any failure releases whatever was acquired and returns
    /// `Error::InputUnavailable`.
    pub fn open(device_name: Option<&str>, frame_size: usize, clock: Arc<dyn Clock>) -> Result<Self> {
        let device = get_input_device(device_name)?;
        let device_name_str = device.name().unwrap_or_else(|_| "Unknown".to_string());

        log::info!("Creating input capture for device: {}", device_name_str);

        let stream_config = get_native_input_config(&device)?;
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels.max(1) as usize;

        log::info!(
            "Input stream config: {} Hz, {} channels",
            sample_rate,
            channels
        );

        // Half a second of mono audio absorbs reader jitter
        let capacity = (sample_rate as usize / 2).max(frame_size * 2);
        let rb = HeapRb::new(capacity);
        let (mut producer, consumer) = rb.split();

        let shared = Arc::new(InputSharedState {
            is_active: AtomicBool::new(true),
            error: RwLock::new(None),
        });
        let error_state = Arc::clone(&shared);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for chunk in data.chunks(channels) {
                        let mono = chunk.iter().sum::<f32>() / chunk.len() as f32;
                        // Drop samples if the reader falls behind
                        let _ = producer.try_push(mono);
                    }
                },
                move |err| {
                    log::error!("Input stream error: {}", err);
                    *error_state.error.write() = Some(err.to_string());
                    error_state.is_active.store(false, Ordering::SeqCst);
                },
                None, // No timeout
            )
            .map_err(|e| Error::input(format!("Failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::input(format!("Failed to start input stream: {}", e)))?;

        log::info!("Input capture started successfully");

        Ok(Self {
            _stream: stream,
            consumer,
            shared,
            window: FrameWindow::new(frame_size, sample_rate),
            scratch: vec![0.0; capacity],
            clock,
            device_name: device_name_str,
            sample_rate,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Actual sample rate of the input device
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active.load(Ordering::SeqCst)
    }
}

impl FrameSource for InputCapture {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        if let Some(err) = self.shared.error.read().clone() {
            return Err(Error::input(err));
        }

        let read = self.consumer.pop_slice(&mut self.scratch);
        if read == 0 {
            return Ok(None);
        }

        self.window.push(&self.scratch[..read]);
        Ok(Some(self.window.frame(self.clock.now_ms())))
    }
}

impl Drop for InputCapture {
    fn drop(&mut self) {
        self.shared.is_active.store(false, Ordering::SeqCst);
        log::info!("Input capture stopped: {}", self.device_name);
    }
}
