//! Recurring timers driven by an external clock
//!
//! Nothing here sleeps. The owner calls `poll` with the current time, which
//! keeps scheduling deterministic under a `ManualClock`.

/// Identifies one armed interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// A source of periodic ticks
pub trait Timer: Send {
    /// Arm a recurring interval. The first tick is due one period after `now_ms`.
    fn set_interval(&mut self, period_ms: f64, now_ms: f64) -> TimerHandle;

    /// Disarm an interval. Clearing an unknown or cleared handle is a no-op.
    fn clear_interval(&mut self, handle: TimerHandle);

    /// Handles of intervals due at `now_ms`. Each fires at most once per poll.
    fn poll(&mut self, now_ms: f64) -> Vec<TimerHandle>;

    /// Number of armed intervals
    fn active_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Interval {
    handle: TimerHandle,
    period_ms: f64,
    next_due_ms: f64,
}

/// In-process interval timer
#[derive(Debug, Default)]
pub struct IntervalTimer {
    intervals: Vec<Interval>,
    next_id: u64,
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Timer for IntervalTimer {
    fn set_interval(&mut self, period_ms: f64, now_ms: f64) -> TimerHandle {
        let period_ms = if period_ms.is_finite() && period_ms > 0.0 {
            period_ms
        } else {
            1.0
        };
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.intervals.push(Interval {
            handle,
            period_ms,
            next_due_ms: now_ms + period_ms,
        });
        handle
    }

    fn clear_interval(&mut self, handle: TimerHandle) {
        self.intervals.retain(|i| i.handle != handle);
    }

    fn poll(&mut self, now_ms: f64) -> Vec<TimerHandle> {
        let mut fired = Vec::new();
        for interval in &mut self.intervals {
            if interval.next_due_ms <= now_ms {
                fired.push(interval.handle);
                // Skip missed periods; re-arm at the next boundary after now
                let missed = ((now_ms - interval.next_due_ms) / interval.period_ms).floor();
                interval.next_due_ms += (missed + 1.0) * interval.period_ms;
            }
        }
        fired
    }

    fn active_count(&self) -> usize {
        self.intervals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_fires_once_per_period() {
        let mut timer = IntervalTimer::new();
        let handle = timer.set_interval(25.0, 0.0);

        assert!(timer.poll(10.0).is_empty());
        assert_eq!(timer.poll(25.0), vec![handle]);
        assert!(timer.poll(30.0).is_empty());
        assert_eq!(timer.poll(50.0), vec![handle]);
    }

    #[test]
    fn test_late_poll_fires_once_and_rearms() {
        let mut timer = IntervalTimer::new();
        let handle = timer.set_interval(25.0, 0.0);

        // Four periods late: one tick, next due at 125
        assert_eq!(timer.poll(110.0), vec![handle]);
        assert!(timer.poll(120.0).is_empty());
        assert_eq!(timer.poll(125.0), vec![handle]);
    }

    #[test]
    fn test_clear_interval() {
        let mut timer = IntervalTimer::new();
        let a = timer.set_interval(10.0, 0.0);
        let b = timer.set_interval(10.0, 0.0);
        assert_ne!(a, b);
        assert_eq!(timer.active_count(), 2);

        timer.clear_interval(a);
        timer.clear_interval(a);
        assert_eq!(timer.active_count(), 1);
        assert_eq!(timer.poll(10.0), vec![b]);
    }
}
