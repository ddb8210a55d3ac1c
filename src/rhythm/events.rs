//! Trigger events and the queue that carries them to the audio thread
//!
//! Uses a lock-free ring buffer for trigger passing.
//! Producer side has a Mutex so the scheduler can live on any thread.
//! Consumer side uses try_lock to avoid blocking the audio callback.

use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};

use super::patterns::Voice;

/// A drum hit scheduled on the session clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub voice: Voice,
    /// When to sound, in seconds on the session clock
    pub time_s: f64,
    /// 1.0 is a normal hit, accented hits are louder
    pub velocity: f32,
    /// Pattern step that produced this hit
    pub step: usize,
}

/// Receiver of scheduled triggers
pub trait TriggerSink {
    fn trigger(&mut self, trigger: Trigger);
}

impl TriggerSink for Vec<Trigger> {
    fn trigger(&mut self, trigger: Trigger) {
        self.push(trigger);
    }
}

/// Thread-safe trigger queue using a lock-free ring buffer
pub struct TriggerQueue {
    producer: Mutex<ringbuf::HeapProd<Trigger>>,
    /// Always use try_lock from the audio thread
    consumer: Mutex<ringbuf::HeapCons<Trigger>>,
    capacity: usize,
}

impl TriggerQueue {
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::new(capacity.max(1));
        let (producer, consumer) = rb.split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            capacity: capacity.max(1),
        }
    }

    /// Push a trigger. Returns false if it was dropped.
    #[inline]
    pub fn push(&self, trigger: Trigger) -> bool {
        if let Some(mut producer) = self.producer.try_lock() {
            if producer.try_push(trigger).is_ok() {
                return true;
            }
            log::debug!(
                "Trigger queue full (capacity: {}), {} hit dropped",
                self.capacity,
                trigger.voice
            );
        }
        false
    }

    /// Drain pending triggers into a pre-allocated buffer, at most
    /// `buffer.capacity()` of them so the buffer never reallocates.
    /// Anything left stays queued for the next call.
    ///
    /// Never blocks: if the lock is held, nothing is drained this time.
    #[inline]
    pub fn drain_into(&self, buffer: &mut Vec<Trigger>) -> usize {
        buffer.clear();
        let room = buffer.capacity();
        if let Some(mut consumer) = self.consumer.try_lock() {
            while buffer.len() < room {
                match consumer.try_pop() {
                    Some(trigger) => buffer.push(trigger),
                    None => break,
                }
            }
        }
        buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.try_lock().map(|c| c.is_empty()).unwrap_or(true)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.try_lock().map(|c| c.occupied_len()).unwrap_or(0)
    }
}

/// A shared queue is used directly as the scheduler's sink
impl TriggerSink for &TriggerQueue {
    fn trigger(&mut self, trigger: Trigger) {
        self.push(trigger);
    }
}
