pub mod controller;
pub mod events;
pub mod runner;

pub use controller::{CompleteOptions, SessionConfig, SessionController};
pub use events::{
    EventBus, EventKind, ListenerId, MessageRecorded, PauseToggled, SegmentChanged,
    SessionCleared, SessionEvent, SessionStarted, Subscription,
};
pub use runner::InterviewRunner;
