//! In-process publish/subscribe for session lifecycle events.
//!
//! Listeners are kept per event kind in registration order. Emission snapshots
//! the listener list and releases the lock before calling out, so a listener may
//! subscribe or unsubscribe from inside a callback. A listener that returns an
//! error or panics is logged and skipped; the remaining listeners still run and
//! the emitting operation is unaffected.

use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Message, Segment, Summary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "session:start")]
    SessionStart,
    #[serde(rename = "segment:start")]
    SegmentStart,
    #[serde(rename = "segment:end")]
    SegmentEnd,
    #[serde(rename = "chat:message")]
    ChatMessage,
    #[serde(rename = "summary")]
    Summary,
    #[serde(rename = "session:finished")]
    SessionFinished,
    #[serde(rename = "session:reset")]
    SessionReset,
    #[serde(rename = "session:pause")]
    SessionPause,
    #[serde(rename = "session:resume")]
    SessionResume,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::SessionStart,
        EventKind::SegmentStart,
        EventKind::SegmentEnd,
        EventKind::ChatMessage,
        EventKind::Summary,
        EventKind::SessionFinished,
        EventKind::SessionReset,
        EventKind::SessionPause,
        EventKind::SessionResume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionStart => "session:start",
            EventKind::SegmentStart => "segment:start",
            EventKind::SegmentEnd => "segment:end",
            EventKind::ChatMessage => "chat:message",
            EventKind::Summary => "summary",
            EventKind::SessionFinished => "session:finished",
            EventKind::SessionReset => "session:reset",
            EventKind::SessionPause => "session:pause",
            EventKind::SessionResume => "session:resume",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: String,
    pub scenario_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentChanged {
    pub session_id: String,
    pub scenario_id: Option<String>,
    pub segment: Segment,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecorded {
    pub session_id: String,
    pub scenario_id: Option<String>,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseToggled {
    pub session_id: String,
    pub scenario_id: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCleared {
    pub session_id: String,
    pub scenario_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum SessionEvent {
    #[serde(rename = "session:start")]
    SessionStart(SessionStarted),
    #[serde(rename = "segment:start")]
    SegmentStart(SegmentChanged),
    #[serde(rename = "segment:end")]
    SegmentEnd(SegmentChanged),
    #[serde(rename = "chat:message")]
    ChatMessage(MessageRecorded),
    #[serde(rename = "summary")]
    Summary(Arc<Summary>),
    #[serde(rename = "session:finished")]
    SessionFinished(Arc<Summary>),
    #[serde(rename = "session:reset")]
    SessionReset(SessionCleared),
    #[serde(rename = "session:pause")]
    SessionPause(PauseToggled),
    #[serde(rename = "session:resume")]
    SessionResume(PauseToggled),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::SessionStart(_) => EventKind::SessionStart,
            SessionEvent::SegmentStart(_) => EventKind::SegmentStart,
            SessionEvent::SegmentEnd(_) => EventKind::SegmentEnd,
            SessionEvent::ChatMessage(_) => EventKind::ChatMessage,
            SessionEvent::Summary(_) => EventKind::Summary,
            SessionEvent::SessionFinished(_) => EventKind::SessionFinished,
            SessionEvent::SessionReset(_) => EventKind::SessionReset,
            SessionEvent::SessionPause(_) => EventKind::SessionPause,
            SessionEvent::SessionResume(_) => EventKind::SessionResume,
        }
    }

    pub fn segment(&self) -> Option<&SegmentChanged> {
        match self {
            SessionEvent::SegmentStart(changed) | SessionEvent::SegmentEnd(changed) => {
                Some(changed)
            }
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&Arc<Summary>> {
        match self {
            SessionEvent::Summary(summary) | SessionEvent::SessionFinished(summary) => {
                Some(summary)
            }
            _ => None,
        }
    }
}

pub type Listener = Arc<dyn Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl Registry {
    fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(&kind);
        }
        removed
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Listener registry for one session. Only the session itself publishes on it;
/// callers can subscribe but not emit:
///
/// ```compile_fail
/// use session_pacer::{session::SessionCleared, EventBus, SessionEvent};
///
/// let bus = EventBus::new();
/// bus.emit(&SessionEvent::SessionReset(SessionCleared {
///     session_id: "sess-1".into(),
///     scenario_id: None,
/// }));
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            kind,
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        lock(&self.registry).remove(kind, id)
    }

    /// Drops the listeners for one kind, or every listener when `kind` is `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut registry = lock(&self.registry);
        match kind {
            Some(kind) => {
                registry.listeners.remove(&kind);
            }
            None => registry.listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        lock(&self.registry)
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = match lock(&self.registry).listeners.get(&kind) {
            Some(entries) => entries.iter().map(|(_, listener)| listener.clone()).collect(),
            None => return,
        };

        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("Session listener for \"{kind}\" failed: {err:#}"),
                Err(_) => error!("Session listener for \"{kind}\" panicked"),
            }
        }
    }
}

/// Handle returned by [`EventBus::on`]. Dropping it keeps the listener.
#[derive(Debug, Clone)]
pub struct Subscription {
    kind: EventKind,
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns false if the listener was already gone or the bus was dropped.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).remove(self.kind, self.id),
            None => false,
        }
    }
}
