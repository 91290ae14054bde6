//! Session lifecycle state and the end-of-session summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Message, Segment};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(SessionState::Idle),
            "running" => Some(SessionState::Running),
            "completed" => Some(SessionState::Completed),
            "aborted" => Some(SessionState::Aborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSummary {
    pub segments: Vec<Segment>,
    pub total_elapsed_ms: u64,
    pub total_planned_ms: u64,
}

impl TimingSummary {
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let total_elapsed_ms = segments.iter().map(|segment| segment.elapsed_ms).sum();
        let total_planned_ms = segments
            .iter()
            .map(|segment| segment.planned_duration_ms.unwrap_or(0))
            .sum();
        Self {
            segments,
            total_elapsed_ms,
            total_planned_ms,
        }
    }
}

/// Immutable report built once when a session completes or is aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub session_id: String,
    pub scenario_id: Option<String>,
    /// `Completed` or `Aborted`.
    pub status: SessionState,
    /// Only populated for aborted sessions.
    pub exit_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub timing: TimingSummary,
    pub chat_log: Vec<Message>,
    pub message_count: usize,
    pub metadata: Value,
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.timing.segments.iter().find(|segment| segment.id == id)
    }
}
