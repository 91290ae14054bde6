use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    clock::{elapsed_ms, system_clock, Clock},
    error::{SessionError, SessionResult},
    models::{
        Message, NewMessage, Segment, SegmentInput, SegmentOutcome, SegmentStatus, SessionState,
        Summary, TimingSummary,
    },
};

use super::events::{
    EventBus, EventKind, ListenerId, MessageRecorded, PauseToggled, SegmentChanged, SessionCleared,
    SessionEvent, SessionStarted, Subscription,
};

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Construction input for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub segments: Vec<SegmentInput>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            scenario_id: None,
            segments: Vec::new(),
            metadata: empty_object(),
        }
    }
}

impl SessionConfig {
    pub fn with_segments(segments: Vec<SegmentInput>) -> Self {
        Self {
            segments,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompleteOptions {
    pub outcome: SegmentOutcome,
    /// Move on to the next segment right after closing this one.
    pub advance: bool,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self {
            outcome: SegmentOutcome::Completed,
            advance: true,
        }
    }
}

impl CompleteOptions {
    pub fn stay() -> Self {
        Self {
            advance: false,
            ..Self::default()
        }
    }

    pub fn interrupted() -> Self {
        Self {
            outcome: SegmentOutcome::Interrupted,
            ..Self::default()
        }
    }
}

/// Terminal variants carry the summary they were finalized with.
#[derive(Debug, Clone)]
enum Lifecycle {
    Idle,
    Running,
    Completed(Arc<Summary>),
    Aborted(Arc<Summary>),
}

impl Lifecycle {
    fn state(&self) -> SessionState {
        match self {
            Lifecycle::Idle => SessionState::Idle,
            Lifecycle::Running => SessionState::Running,
            Lifecycle::Completed(_) => SessionState::Completed,
            Lifecycle::Aborted(_) => SessionState::Aborted,
        }
    }

    fn summary(&self) -> Option<&Arc<Summary>> {
        match self {
            Lifecycle::Completed(summary) | Lifecycle::Aborted(summary) => Some(summary),
            Lifecycle::Idle | Lifecycle::Running => None,
        }
    }
}

#[derive(Debug, Clone)]
struct SegmentSlot {
    record: Segment,
    /// Start of the current accrual window; `None` while closed or paused.
    active_since: Option<DateTime<Utc>>,
}

/// One interview run: segment progression, transcript, and lifecycle events.
///
/// State only moves through the methods below. Calls that make no sense for the
/// current state (advancing an idle session, beginning twice) are ignored and
/// report so through their return value. Accessors hand out copies.
pub struct SessionController {
    session_id: String,
    scenario_id: Option<String>,
    metadata: Value,
    clock: Arc<dyn Clock>,
    events: EventBus,
    lifecycle: Lifecycle,
    paused: bool,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    exit_reason: Option<String>,
    segments: Vec<SegmentSlot>,
    current_index: Option<usize>,
    chat_log: Vec<Message>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        let session_id = config
            .session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| generate_session_id(clock.now()));

        let segments = config
            .segments
            .iter()
            .enumerate()
            .map(|(position, input)| SegmentSlot {
                record: Segment::from_input(position, input),
                active_since: None,
            })
            .collect();

        Self {
            session_id,
            scenario_id: config.scenario_id,
            metadata: config.metadata,
            clock,
            events: EventBus::new(),
            lifecycle: Lifecycle::Idle,
            paused: false,
            started_at: None,
            ended_at: None,
            exit_reason: None,
            segments,
            current_index: None,
            chat_log: Vec::new(),
        }
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        self.events.remove_all_listeners(kind);
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn scenario_id(&self) -> Option<&str> {
        self.scenario_id.as_deref()
    }

    pub fn metadata(&self) -> Value {
        self.metadata.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn exit_reason(&self) -> Option<&str> {
        self.exit_reason.as_deref()
    }

    pub fn summary(&self) -> Option<Arc<Summary>> {
        self.lifecycle.summary().cloned()
    }

    pub fn current_segment_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_segment(&self) -> Option<Segment> {
        self.current_index
            .and_then(|index| self.segments.get(index))
            .map(|slot| slot.record.clone())
    }

    /// The current segment, if it is still in progress.
    pub fn active_segment(&self) -> Option<Segment> {
        self.current_segment()
            .filter(|segment| segment.status == SegmentStatus::InProgress)
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.segments.iter().map(|slot| slot.record.clone()).collect()
    }

    pub fn chat_log(&self) -> Vec<Message> {
        self.chat_log.clone()
    }

    pub fn begin(&mut self) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Idle) {
            return false;
        }
        let started_at = self.clock.now();
        self.started_at = Some(started_at);
        self.lifecycle = Lifecycle::Running;
        info!("Session {} started", self.session_id);

        self.events.emit(&SessionEvent::SessionStart(SessionStarted {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            started_at,
            metadata: self.metadata.clone(),
        }));
        true
    }

    /// Closes the active segment and opens the next one. Past the last segment
    /// the session finishes and `None` is returned.
    pub fn advance(&mut self) -> Option<Segment> {
        if !matches!(self.lifecycle, Lifecycle::Running) {
            return None;
        }

        self.close_active_segment(SegmentOutcome::Completed);

        let next_index = self.current_index.map_or(0, |index| index + 1);
        if next_index >= self.segments.len() {
            self.finish();
            return None;
        }

        self.current_index = Some(next_index);
        let now = self.clock.now();
        let paused = self.paused;
        let slot = &mut self.segments[next_index];
        if slot.record.started_at.is_none() {
            slot.record.started_at = Some(now);
            if !paused {
                slot.active_since = Some(now);
            }
        }
        slot.record.status = SegmentStatus::InProgress;
        let segment = slot.record.clone();
        debug!(
            "Session {} entered segment {} ({})",
            self.session_id, next_index, segment.id
        );

        self.events.emit(&SessionEvent::SegmentStart(SegmentChanged {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            segment: segment.clone(),
            index: next_index,
        }));
        Some(segment)
    }

    /// Closes the active segment with the given outcome, then optionally
    /// advances. Returns the closed segment as it was at closing time.
    pub fn complete_current_segment(&mut self, options: CompleteOptions) -> Option<Segment> {
        if !matches!(self.lifecycle, Lifecycle::Running) {
            return None;
        }
        let closed = self.close_active_segment(options.outcome)?;
        if options.advance {
            self.advance();
        }
        Some(closed)
    }

    pub fn record_message(&mut self, message: NewMessage) -> SessionResult<Message> {
        if message.role.trim().is_empty() {
            return Err(SessionError::MissingRole);
        }
        if message.content.trim().is_empty() {
            return Err(SessionError::MissingContent);
        }

        let id = message
            .metadata
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("msg-{}", self.chat_log.len() + 1));

        let entry = Message {
            id,
            role: message.role,
            content: message.content,
            timestamp: self.clock.now(),
            metadata: message.metadata,
        };
        self.chat_log.push(entry.clone());

        self.events.emit(&SessionEvent::ChatMessage(MessageRecorded {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            message: entry.clone(),
        }));
        Ok(entry)
    }

    /// Stops time accrual on the active segment until [`resume`](Self::resume).
    pub fn pause(&mut self) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Running) || self.paused {
            return false;
        }
        let now = self.clock.now();
        if let Some(slot) = self.current_index.and_then(|index| self.segments.get_mut(index)) {
            if let Some(since) = slot.active_since.take() {
                slot.record.elapsed_ms += elapsed_ms(since, now);
            }
        }
        self.paused = true;
        info!("Session {} paused", self.session_id);

        self.events.emit(&SessionEvent::SessionPause(PauseToggled {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            at: now,
        }));
        true
    }

    pub fn resume(&mut self) -> bool {
        if !matches!(self.lifecycle, Lifecycle::Running) || !self.paused {
            return false;
        }
        let now = self.clock.now();
        if let Some(slot) = self.current_index.and_then(|index| self.segments.get_mut(index)) {
            if slot.record.status == SegmentStatus::InProgress {
                slot.active_since = Some(now);
            }
        }
        self.paused = false;
        info!("Session {} resumed", self.session_id);

        self.events.emit(&SessionEvent::SessionResume(PauseToggled {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            at: now,
        }));
        true
    }

    /// Completes the session. Once finalized, every later call to `finish` or
    /// `exit_early` returns the same summary.
    pub fn finish(&mut self) -> Arc<Summary> {
        if let Some(summary) = self.lifecycle.summary() {
            return summary.clone();
        }
        if matches!(self.lifecycle, Lifecycle::Running) {
            self.close_active_segment(SegmentOutcome::Completed);
        }

        self.paused = false;
        self.ended_at = Some(self.clock.now());
        let summary = Arc::new(self.build_summary(SessionState::Completed));
        self.lifecycle = Lifecycle::Completed(summary.clone());
        info!(
            "Session {} completed after {} ms",
            self.session_id, summary.total_duration_ms
        );

        self.events.emit(&SessionEvent::Summary(summary.clone()));
        self.events
            .emit(&SessionEvent::SessionFinished(summary.clone()));
        summary
    }

    pub fn exit_early(&mut self, reason: impl Into<String>) -> Arc<Summary> {
        if let Some(summary) = self.lifecycle.summary() {
            return summary.clone();
        }
        if matches!(self.lifecycle, Lifecycle::Running) {
            self.close_active_segment(SegmentOutcome::Interrupted);
        }

        self.paused = false;
        self.exit_reason = Some(reason.into());
        self.ended_at = Some(self.clock.now());
        let summary = Arc::new(self.build_summary(SessionState::Aborted));
        self.lifecycle = Lifecycle::Aborted(summary.clone());
        info!(
            "Session {} aborted: {}",
            self.session_id,
            self.exit_reason.as_deref().unwrap_or_default()
        );

        self.events.emit(&SessionEvent::Summary(summary.clone()));
        self.events
            .emit(&SessionEvent::SessionFinished(summary.clone()));
        summary
    }

    /// Starts over from idle: timing, transcript and summary are discarded.
    pub fn reset(&mut self) {
        self.lifecycle = Lifecycle::Idle;
        self.paused = false;
        self.started_at = None;
        self.ended_at = None;
        self.exit_reason = None;
        self.chat_log.clear();
        for slot in &mut self.segments {
            slot.record.clear_timing();
            slot.active_since = None;
        }
        self.current_index = None;
        info!("Session {} reset", self.session_id);

        self.events.emit(&SessionEvent::SessionReset(SessionCleared {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
        }));
    }

    fn close_active_segment(&mut self, outcome: SegmentOutcome) -> Option<Segment> {
        let index = self.current_index?;
        let now = self.clock.now();
        let slot = self.segments.get_mut(index)?;
        if slot.record.status != SegmentStatus::InProgress {
            return None;
        }

        if slot.record.started_at.is_none() {
            slot.record.started_at = Some(now);
        }
        if let Some(since) = slot.active_since.take() {
            slot.record.elapsed_ms += elapsed_ms(since, now);
        }
        slot.record.ended_at = Some(now);
        slot.record.status = outcome.into();
        let segment = slot.record.clone();
        debug!(
            "Session {} closed segment {} as {}",
            self.session_id,
            segment.id,
            segment.status.as_str()
        );

        self.events.emit(&SessionEvent::SegmentEnd(SegmentChanged {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            segment: segment.clone(),
            index,
        }));
        Some(segment)
    }

    fn build_summary(&self, status: SessionState) -> Summary {
        let completed_at = self.ended_at.unwrap_or_else(|| self.clock.now());
        let timing = TimingSummary::from_segments(self.segments());
        let total_duration_ms = match self.started_at {
            Some(started_at) => elapsed_ms(started_at, completed_at),
            None => timing.total_elapsed_ms,
        };

        Summary {
            session_id: self.session_id.clone(),
            scenario_id: self.scenario_id.clone(),
            status,
            exit_reason: if status == SessionState::Aborted {
                self.exit_reason.clone()
            } else {
                None
            },
            started_at: self.started_at,
            ended_at: completed_at,
            total_duration_ms,
            timing,
            chat_log: self.chat_log(),
            message_count: self.chat_log.len(),
            metadata: self.metadata.clone(),
            generated_at: self.clock.now(),
        }
    }
}

fn generate_session_id(now: DateTime<Utc>) -> String {
    format!("sess-{}-{}", Uuid::new_v4().simple(), now.timestamp_millis())
}
