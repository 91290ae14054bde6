use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{system_clock, Clock},
    models::{
        segment::{default_segment_id, default_segment_name},
        SegmentInput,
    },
};

/// A segment that carries a countdown. Entries without a positive duration
/// never become one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedSegment {
    pub id: String,
    pub name: String,
    pub duration_secs: f64,
}

/// Keeps only entries with a positive, finite duration. Ids and names are
/// derived from the entry's position in the raw list, before filtering.
pub fn normalize_timed_segments(inputs: &[SegmentInput]) -> Vec<TimedSegment> {
    inputs
        .iter()
        .enumerate()
        .filter_map(|(position, input)| {
            let duration_secs = input
                .countdown_secs()
                .filter(|secs| secs.is_finite() && *secs > 0.0)?;
            Some(TimedSegment {
                id: input
                    .id()
                    .map(str::to_string)
                    .unwrap_or_else(|| default_segment_id(position)),
                name: input
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| default_segment_name(position)),
                duration_secs,
            })
        })
        .collect()
}

/// What a tick or skip did to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Inactive, paused, complete, or no time has passed.
    Ignored,
    Counted { remaining_secs: f64 },
    /// `completed` ran out and `current` is now counting down.
    Advanced { completed: usize, current: usize },
    /// The last segment ran out.
    Finished { completed: usize },
}

impl TickOutcome {
    pub fn completed_index(&self) -> Option<usize> {
        match self {
            TickOutcome::Advanced { completed, .. } | TickOutcome::Finished { completed } => {
                Some(*completed)
            }
            TickOutcome::Ignored | TickOutcome::Counted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub segments: Vec<TimedSegment>,
    pub current_segment_index: usize,
    pub current_segment: Option<TimedSegment>,
    pub remaining_seconds: f64,
    pub is_active: bool,
    pub is_paused: bool,
    pub is_complete: bool,
    pub total_elapsed_seconds: f64,
    pub total_duration_seconds: f64,
    pub segment_progress: f64,
    pub overall_progress: f64,
}

/// Single-countdown engine that walks an ordered list of timed segments.
///
/// The engine never ticks by itself; a driver (see `TimerController`) calls
/// [`SegmentScheduler::tick`] on an interval. Each tick measures the real time
/// since the previous anchor, so late or dropped ticks are absorbed by the next
/// one rather than replayed.
pub struct SegmentScheduler {
    clock: Arc<dyn Clock>,
    segments: Vec<TimedSegment>,
    total_duration_secs: f64,
    current_index: usize,
    remaining_secs: f64,
    total_elapsed_secs: f64,
    active: bool,
    paused: bool,
    complete: bool,
    last_tick: Option<DateTime<Utc>>,
}

impl SegmentScheduler {
    pub fn new(inputs: &[SegmentInput]) -> Self {
        Self::with_clock(inputs, system_clock())
    }

    pub fn with_clock(inputs: &[SegmentInput], clock: Arc<dyn Clock>) -> Self {
        let mut scheduler = Self {
            clock,
            segments: Vec::new(),
            total_duration_secs: 0.0,
            current_index: 0,
            remaining_secs: 0.0,
            total_elapsed_secs: 0.0,
            active: false,
            paused: true,
            complete: true,
            last_tick: None,
        };
        scheduler.set_segments(inputs);
        scheduler
    }

    /// Replaces the segment plan. Progress never carries over to a new plan.
    pub fn set_segments(&mut self, inputs: &[SegmentInput]) {
        self.segments = normalize_timed_segments(inputs);
        self.total_duration_secs = self.segments.iter().map(|s| s.duration_secs).sum();
        self.reset();
    }

    pub fn start(&mut self) -> bool {
        let Some(first) = self.segments.first() else {
            return false;
        };
        self.current_index = 0;
        self.remaining_secs = first.duration_secs;
        self.active = true;
        self.paused = false;
        self.complete = false;
        self.total_elapsed_secs = 0.0;
        self.last_tick = Some(self.clock.now());
        debug!("scheduler started with {} segments", self.segments.len());
        true
    }

    pub fn pause(&mut self) -> bool {
        if !self.active || self.paused || self.complete {
            return false;
        }
        self.paused = true;
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.active || !self.paused || self.complete {
            return false;
        }
        self.paused = false;
        // Re-anchor so the paused interval is never counted.
        self.last_tick = Some(self.clock.now());
        true
    }

    /// Ends the current segment immediately, as if its countdown hit zero.
    pub fn skip(&mut self) -> TickOutcome {
        if !self.active || self.complete {
            return TickOutcome::Ignored;
        }
        self.advance_segment()
    }

    pub fn reset(&mut self) {
        self.current_index = 0;
        self.remaining_secs = self.segments.first().map_or(0.0, |s| s.duration_secs);
        self.active = false;
        self.paused = true;
        self.complete = self.segments.is_empty();
        self.total_elapsed_secs = 0.0;
        self.last_tick = None;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Ignored;
        }

        let now = self.clock.now();
        let last = self.last_tick.unwrap_or(now);
        let delta_secs = (now - last).num_milliseconds() as f64 / 1000.0;
        self.last_tick = Some(now);

        if delta_secs <= 0.0 {
            return TickOutcome::Ignored;
        }

        self.total_elapsed_secs =
            (self.total_elapsed_secs + delta_secs).min(self.total_duration_secs);

        let next_remaining = self.remaining_secs - delta_secs;
        if next_remaining <= 0.0 {
            // Overshoot is dropped, the next segment starts with its full length.
            self.remaining_secs = 0.0;
            self.advance_segment()
        } else {
            self.remaining_secs = next_remaining;
            TickOutcome::Counted {
                remaining_secs: next_remaining,
            }
        }
    }

    fn advance_segment(&mut self) -> TickOutcome {
        let completed = self.current_index;
        let next_index = completed + 1;

        let Some(next) = self.segments.get(next_index) else {
            self.complete = true;
            self.active = false;
            self.paused = true;
            self.last_tick = None;
            self.remaining_secs = 0.0;
            self.total_elapsed_secs = self.total_duration_secs;
            debug!("scheduler finished after segment {completed}");
            return TickOutcome::Finished { completed };
        };

        self.remaining_secs = next.duration_secs;
        self.current_index = next_index;
        self.last_tick = Some(self.clock.now());
        debug!("scheduler advanced to segment {next_index}");
        TickOutcome::Advanced {
            completed,
            current: next_index,
        }
    }

    /// Active, unpaused and not complete: the only state in which ticks count.
    pub fn is_running(&self) -> bool {
        self.active && !self.paused && !self.complete
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn segments(&self) -> &[TimedSegment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&TimedSegment> {
        self.segments.get(index)
    }

    pub fn current_segment_index(&self) -> usize {
        self.current_index
    }

    pub fn current_segment(&self) -> Option<&TimedSegment> {
        self.segments.get(self.current_index)
    }

    pub fn remaining_secs(&self) -> f64 {
        self.remaining_secs
    }

    pub fn total_elapsed_secs(&self) -> f64 {
        self.total_elapsed_secs
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.total_duration_secs
    }

    pub fn segment_progress(&self) -> f64 {
        match self.current_segment() {
            Some(segment) if segment.duration_secs > 0.0 => {
                (1.0 - self.remaining_secs / segment.duration_secs).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn overall_progress(&self) -> f64 {
        if self.total_duration_secs == 0.0 {
            return 0.0;
        }
        (self.total_elapsed_secs / self.total_duration_secs).clamp(0.0, 1.0)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            segments: self.segments.clone(),
            current_segment_index: self.current_index,
            current_segment: self.current_segment().cloned(),
            remaining_seconds: self.remaining_secs,
            is_active: self.active,
            is_paused: self.paused,
            is_complete: self.complete,
            total_elapsed_seconds: self.total_elapsed_secs,
            total_duration_seconds: self.total_duration_secs,
            segment_progress: self.segment_progress(),
            overall_progress: self.overall_progress(),
        }
    }
}
