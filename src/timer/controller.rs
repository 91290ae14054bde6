use std::{sync::Arc, time::Duration};

use log::{debug, info};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    clock::{system_clock, Clock},
    models::SegmentInput,
    settings::RunnerSettings,
};

use super::{SchedulerSnapshot, SegmentScheduler, TickOutcome, TimedSegment};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ElapsedCause {
    Countdown,
    Skipped,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentElapsed {
    pub index: usize,
    pub segment: TimedSegment,
    pub cause: ElapsedCause,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum TimerEvent {
    StateChanged(SchedulerSnapshot),
    Tick(SchedulerSnapshot),
    SegmentElapsed(SegmentElapsed),
    Completed(SchedulerSnapshot),
}

/// Drives a [`SegmentScheduler`] with a background ticker.
///
/// The ticker is the only place the scheduler is advanced by time. Every tick
/// re-checks the scheduler under the lock, so once `pause`, `reset` or the final
/// segment has returned, no further tick can mutate it.
#[derive(Clone)]
pub struct TimerController {
    scheduler: Arc<Mutex<SegmentScheduler>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
    events: broadcast::Sender<TimerEvent>,
}

impl TimerController {
    pub fn new(inputs: &[SegmentInput], settings: &RunnerSettings) -> Self {
        Self::with_clock(inputs, settings, system_clock())
    }

    pub fn with_clock(
        inputs: &[SegmentInput],
        settings: &RunnerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            scheduler: Arc::new(Mutex::new(SegmentScheduler::with_clock(inputs, clock))),
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: settings.tick_interval(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub async fn get_snapshot(&self) -> SchedulerSnapshot {
        self.scheduler.lock().await.snapshot()
    }

    pub async fn start(&self) -> SchedulerSnapshot {
        let (started, snapshot) = {
            let mut guard = self.scheduler.lock().await;
            let started = guard.start();
            (started, guard.snapshot())
        };

        if started {
            self.spawn_ticker().await;
            info!(
                "Timer started: {} segments, {:.0}s planned",
                snapshot.segments.len(),
                snapshot.total_duration_seconds
            );
            self.emit(TimerEvent::StateChanged(snapshot.clone()));
        }

        snapshot
    }

    pub async fn pause(&self) -> SchedulerSnapshot {
        let (paused, snapshot) = {
            let mut guard = self.scheduler.lock().await;
            let paused = guard.pause();
            (paused, guard.snapshot())
        };

        if paused {
            self.cancel_ticker().await;
            info!(
                "Timer paused with {:.1}s remaining in segment {}",
                snapshot.remaining_seconds, snapshot.current_segment_index
            );
            self.emit(TimerEvent::StateChanged(snapshot.clone()));
        }

        snapshot
    }

    pub async fn resume(&self) -> SchedulerSnapshot {
        let (resumed, snapshot) = {
            let mut guard = self.scheduler.lock().await;
            let resumed = guard.resume();
            (resumed, guard.snapshot())
        };

        if resumed {
            self.spawn_ticker().await;
            info!("Timer resumed");
            self.emit(TimerEvent::StateChanged(snapshot.clone()));
        }

        snapshot
    }

    pub async fn skip(&self) -> (TickOutcome, SchedulerSnapshot) {
        let (outcome, elapsed, snapshot) = {
            let mut guard = self.scheduler.lock().await;
            let outcome = guard.skip();
            let elapsed = outcome
                .completed_index()
                .and_then(|index| guard.segment(index).cloned());
            (outcome, elapsed, guard.snapshot())
        };

        if matches!(outcome, TickOutcome::Finished { .. }) {
            self.cancel_ticker().await;
        }
        if outcome != TickOutcome::Ignored {
            info!("Timer skipped segment {:?}", outcome.completed_index());
        }
        publish_outcome(
            &self.events,
            outcome,
            elapsed,
            ElapsedCause::Skipped,
            snapshot.clone(),
        );

        (outcome, snapshot)
    }

    pub async fn reset(&self) -> SchedulerSnapshot {
        let snapshot = {
            let mut guard = self.scheduler.lock().await;
            guard.reset();
            guard.snapshot()
        };
        self.cancel_ticker().await;
        info!("Timer reset");
        self.emit(TimerEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    /// Swaps the segment plan; any run in progress is discarded.
    pub async fn set_segments(&self, inputs: &[SegmentInput]) -> SchedulerSnapshot {
        let snapshot = {
            let mut guard = self.scheduler.lock().await;
            guard.set_segments(inputs);
            guard.snapshot()
        };
        self.cancel_ticker().await;
        info!("Timer plan replaced: {} timed segments", snapshot.segments.len());
        self.emit(TimerEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    pub async fn shutdown(&self) {
        self.cancel_ticker().await;
    }

    pub async fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let scheduler = self.scheduler.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            // A late wake-up is absorbed by the wall-clock delta, never replayed.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let (outcome, elapsed, snapshot) = {
                    let mut guard = scheduler.lock().await;
                    if !guard.is_running() {
                        break;
                    }
                    let outcome = guard.tick();
                    let elapsed = outcome
                        .completed_index()
                        .and_then(|index| guard.segment(index).cloned());
                    (outcome, elapsed, guard.snapshot())
                };

                let finished = matches!(outcome, TickOutcome::Finished { .. });
                publish_outcome(&events, outcome, elapsed, ElapsedCause::Countdown, snapshot);

                if finished {
                    info!("Timer completed all segments");
                    break;
                }
            }
            debug!("Timer ticker exiting");
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

fn publish_outcome(
    events: &broadcast::Sender<TimerEvent>,
    outcome: TickOutcome,
    elapsed: Option<TimedSegment>,
    cause: ElapsedCause,
    snapshot: SchedulerSnapshot,
) {
    let elapsed_event = |index: usize| {
        elapsed.clone().map(|segment| {
            TimerEvent::SegmentElapsed(SegmentElapsed {
                index,
                segment,
                cause,
            })
        })
    };

    match outcome {
        TickOutcome::Ignored => {}
        TickOutcome::Counted { .. } => {
            let _ = events.send(TimerEvent::Tick(snapshot));
        }
        TickOutcome::Advanced { completed, .. } => {
            if let Some(event) = elapsed_event(completed) {
                let _ = events.send(event);
            }
            let _ = events.send(TimerEvent::StateChanged(snapshot));
        }
        TickOutcome::Finished { completed } => {
            if let Some(event) = elapsed_event(completed) {
                let _ = events.send(event);
            }
            let _ = events.send(TimerEvent::Completed(snapshot));
        }
    }
}
