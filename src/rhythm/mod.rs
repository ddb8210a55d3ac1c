//! Drum pattern playback
//!
//! Provides the pattern library, trigger events and queueing, and the
//! lookahead step scheduler.

pub mod events;
pub mod patterns;
pub mod scheduler;
pub mod timer;

pub use events::{Trigger, TriggerQueue, TriggerSink};
pub use patterns::{
    get_preset, Pattern, PatternInfo, PatternKind, PatternLibrary, RandomDensity, Voice,
    ALL_PRESETS, STEPS_PER_PATTERN,
};
pub use scheduler::{step_duration, RhythmScheduler, ScheduleState, SchedulerConfig};
pub use timer::{IntervalTimer, Timer, TimerHandle};
