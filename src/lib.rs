//! Pacing engine for timed mock-interview sessions.
//!
//! [`SessionController`] owns the session lifecycle, segment bookkeeping and
//! chat log. [`TimerController`] runs the wall-clock countdown across timed
//! segments, and [`InterviewRunner`] ties the two together so countdown
//! expiry closes the matching session segment.

pub mod chat;
pub mod clock;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod scenarios;
pub mod session;
pub mod settings;
pub mod timer;
pub mod utils;

pub use chat::{ChatBackend, ChatRequest, ChatTurn};
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{Database, TranscriptRecord};
pub use error::{SessionError, SessionResult};
pub use models::{
    Message, NewMessage, Segment, SegmentInput, SegmentOutcome, SegmentSpec, SegmentStatus,
    SessionState, Summary, TimingSummary,
};
pub use scenarios::{Scenario, ScenarioManifest};
pub use session::{
    CompleteOptions, EventBus, EventKind, InterviewRunner, SessionConfig, SessionController,
    SessionEvent, Subscription,
};
pub use settings::{RunnerSettings, SettingsStore};
pub use timer::{SchedulerSnapshot, SegmentScheduler, TickOutcome, TimerController, TimerEvent};
pub use utils::init_logging;
