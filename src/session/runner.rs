use std::sync::Arc;

use log::{debug, info, warn};
use tokio::{
    sync::{broadcast::error::RecvError, Mutex},
    task::JoinHandle,
};

use crate::{
    chat::{ChatBackend, ChatRequest},
    clock::{system_clock, Clock},
    error::{SessionError, SessionResult},
    models::{Message, NewMessage, Segment, SessionState, Summary, SEGMENT_ID_KEY},
    settings::RunnerSettings,
    timer::{ElapsedCause, SchedulerSnapshot, TimerController, TimerEvent},
};

use super::{
    controller::{CompleteOptions, SessionConfig, SessionController},
    events::{EventKind, SessionEvent, Subscription},
};

/// Runs a [`SessionController`] against a countdown.
///
/// When a segment's countdown runs out the runner completes the controller
/// segment with the same id, if that segment is still the active one. Entries
/// the countdown drops (no positive duration) stay manual steps on the
/// controller side, and the countdown is held while one of them is active.
pub struct InterviewRunner {
    controller: Arc<Mutex<SessionController>>,
    timer: TimerController,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    default_exit_reason: String,
}

impl InterviewRunner {
    pub fn new(config: SessionConfig, settings: &RunnerSettings) -> Self {
        Self::with_clock(config, settings, system_clock())
    }

    pub fn with_clock(config: SessionConfig, settings: &RunnerSettings, clock: Arc<dyn Clock>) -> Self {
        let timer = TimerController::with_clock(&config.segments, settings, clock.clone());
        let controller = SessionController::with_clock(config, clock);
        Self {
            controller: Arc::new(Mutex::new(controller)),
            timer,
            forwarder: Mutex::new(None),
            default_exit_reason: settings.default_exit_reason.clone(),
        }
    }

    pub fn controller(&self) -> Arc<Mutex<SessionController>> {
        self.controller.clone()
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub async fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.controller.lock().await.on(kind, handler)
    }

    pub async fn state(&self) -> SessionState {
        self.controller.lock().await.state()
    }

    pub async fn segments(&self) -> Vec<Segment> {
        self.controller.lock().await.segments()
    }

    pub async fn countdown(&self) -> SchedulerSnapshot {
        self.timer.get_snapshot().await
    }

    /// Begins the session, opens the first segment and starts the countdown.
    /// Returns `None` if the session was not idle.
    pub async fn start(&self) -> Option<Segment> {
        let mut controller = self.controller.lock().await;
        if !controller.begin() {
            return None;
        }
        let first = controller.advance();

        self.spawn_forwarder().await;
        self.timer.start().await;
        align_timer(&controller, &self.timer).await;
        first
    }

    pub async fn pause(&self) -> bool {
        let mut controller = self.controller.lock().await;
        let paused = controller.pause();
        align_timer(&controller, &self.timer).await;
        paused
    }

    pub async fn resume(&self) -> bool {
        let mut controller = self.controller.lock().await;
        let resumed = controller.resume();
        align_timer(&controller, &self.timer).await;
        resumed
    }

    /// Ends the active segment now. The countdown is skipped only when it is
    /// running for that same segment.
    pub async fn skip(&self) -> Option<Segment> {
        let mut controller = self.controller.lock().await;
        let active = controller.active_segment()?;
        let countdown = self.timer.get_snapshot().await;
        if countdown.is_active
            && countdown
                .current_segment
                .as_ref()
                .is_some_and(|timed| timed.id == active.id)
        {
            self.timer.skip().await;
        }

        let closed = controller.complete_current_segment(CompleteOptions::default());
        align_timer(&controller, &self.timer).await;
        closed
    }

    pub async fn finish(&self) -> Arc<Summary> {
        self.stop_timing().await;
        self.controller.lock().await.finish()
    }

    pub async fn exit_early(&self, reason: Option<&str>) -> Arc<Summary> {
        self.stop_timing().await;
        let reason = reason.unwrap_or(&self.default_exit_reason).to_string();
        self.controller.lock().await.exit_early(reason)
    }

    pub async fn reset(&self) {
        self.abort_forwarder().await;
        self.timer.reset().await;
        self.controller.lock().await.reset();
    }

    pub async fn shutdown(&self) {
        self.abort_forwarder().await;
        self.timer.shutdown().await;
    }

    /// Records a message, tagging it with the active segment unless the caller
    /// already did.
    pub async fn record_message(&self, mut message: NewMessage) -> SessionResult<Message> {
        let mut controller = self.controller.lock().await;
        if !message.metadata.contains_key(SEGMENT_ID_KEY) {
            if let Some(segment) = controller.active_segment() {
                message.metadata.insert(SEGMENT_ID_KEY.into(), segment.id.into());
            }
        }
        controller.record_message(message)
    }

    /// Records the candidate's message, asks the backend for the interviewer's
    /// reply and records it. A failed call leaves a system note in the
    /// transcript and returns `ChatCompletion`.
    pub async fn ask<B: ChatBackend>(
        &self,
        backend: &B,
        content: impl Into<String>,
    ) -> SessionResult<Message> {
        let request = {
            let mut controller = self.controller.lock().await;
            let segment = controller
                .active_segment()
                .ok_or(SessionError::NoActiveSegment)?;
            controller.record_message(NewMessage::user(content).in_segment(segment.id))?;
            ChatRequest::for_active_segment(&controller).ok_or(SessionError::NoActiveSegment)?
        };
        let segment_id = request.segment_id.clone();

        let failure = match backend.complete(request).await {
            Ok(reply) if !reply.trim().is_empty() => {
                return self
                    .controller
                    .lock()
                    .await
                    .record_message(NewMessage::assistant(reply).in_segment(segment_id));
            }
            Ok(_) => "empty reply".to_string(),
            Err(err) => format!("{err:#}"),
        };

        warn!("Chat completion failed in segment {segment_id}: {failure}");
        self.controller.lock().await.record_message(
            NewMessage::system(format!("The interviewer could not respond: {failure}"))
                .in_segment(segment_id),
        )?;
        Err(SessionError::ChatCompletion(failure))
    }

    async fn stop_timing(&self) {
        self.abort_forwarder().await;
        self.timer.pause().await;
        self.timer.shutdown().await;
    }

    async fn spawn_forwarder(&self) {
        let mut guard = self.forwarder.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        // Subscribe before the countdown starts so no elapsed segment is missed.
        let mut events = self.timer.subscribe();
        let controller = self.controller.clone();
        let timer = self.timer.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TimerEvent::SegmentElapsed(elapsed))
                        if elapsed.cause == ElapsedCause::Countdown =>
                    {
                        let mut session = controller.lock().await;
                        let is_active = session
                            .active_segment()
                            .is_some_and(|segment| segment.id == elapsed.segment.id);
                        if !is_active {
                            debug!(
                                "Countdown for {} ran out after the session moved on; ignoring",
                                elapsed.segment.id
                            );
                            continue;
                        }
                        session.complete_current_segment(CompleteOptions::default());
                        align_timer(&session, &timer).await;
                        debug!("Countdown for {} ran out; segment closed", elapsed.segment.id);
                    }
                    Ok(TimerEvent::Completed(_)) => {
                        info!("Countdown finished");
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Runner fell behind the timer by {missed} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        *guard = Some(handle);
    }

    async fn abort_forwarder(&self) {
        if let Some(handle) = self.forwarder.lock().await.take() {
            handle.abort();
        }
    }
}

/// Runs the countdown only while the session is unpaused and its active segment
/// is the one being counted down; holds it otherwise.
async fn align_timer(controller: &SessionController, timer: &TimerController) {
    let countdown = timer.get_snapshot().await;
    let on_timed_segment = match (controller.active_segment(), countdown.current_segment.as_ref()) {
        (Some(active), Some(timed)) => active.id == timed.id,
        _ => false,
    };

    if on_timed_segment && !controller.is_paused() {
        if countdown.is_active && countdown.is_paused {
            timer.resume().await;
        }
    } else if countdown.is_active && !countdown.is_paused {
        timer.pause().await;
    }
}
