//! Monotonic time sources
//!
//! Every timestamp in the crate is milliseconds on one of these clocks. Trigger
//! times handed to the output side are seconds on the same clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A monotonic millisecond clock
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's origin
    fn now_ms(&self) -> f64;

    /// Seconds since the clock's origin
    fn now_secs(&self) -> f64 {
        self.now_ms() / 1000.0
    }
}

/// Wall clock backed by `Instant`, starting at zero when created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Helper to store f64 in AtomicU64
#[inline]
fn f64_to_u64(f: f64) -> u64 {
    f.to_bits()
}

/// Helper to load f64 from AtomicU64
#[inline]
fn u64_to_f64(u: u64) -> f64 {
    f64::from_bits(u)
}

/// Manually driven clock for simulations and tests.
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(f64_to_u64(start_ms))),
        }
    }

    /// Jump to an absolute time
    pub fn set_ms(&self, ms: f64) {
        self.now.store(f64_to_u64(ms), Ordering::SeqCst);
    }

    /// Move forward by `ms`
    pub fn advance_ms(&self, ms: f64) {
        let current = u64_to_f64(self.now.load(Ordering::SeqCst));
        self.set_ms(current + ms);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        u64_to_f64(self.now.load(Ordering::SeqCst))
    }
}
