pub mod controller;
pub mod state;

pub use controller::{ElapsedCause, SegmentElapsed, TimerController, TimerEvent};
pub use state::{
    normalize_timed_segments, SchedulerSnapshot, SegmentScheduler, TickOutcome, TimedSegment,
};
