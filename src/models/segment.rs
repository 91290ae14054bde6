use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw segment entry as it arrives from configuration: a bare number of seconds
/// or an object carrying any of the accepted duration fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentInput {
    Seconds(f64),
    Spec(SegmentSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentSpec {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Seconds.
    pub duration: Option<f64>,
    /// Seconds.
    pub seconds: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub duration_ms: Option<f64>,
    pub meta: Option<Value>,
}

impl SegmentInput {
    pub fn seconds(secs: f64) -> Self {
        SegmentInput::Seconds(secs)
    }

    pub fn named(name: impl Into<String>, duration_secs: f64) -> Self {
        SegmentInput::Spec(SegmentSpec {
            name: Some(name.into()),
            duration: Some(duration_secs),
            ..SegmentSpec::default()
        })
    }

    fn spec(&self) -> Option<&SegmentSpec> {
        match self {
            SegmentInput::Seconds(_) => None,
            SegmentInput::Spec(spec) => Some(spec),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.spec().and_then(|spec| spec.id.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        self.spec().and_then(|spec| spec.name.as_deref())
    }

    pub fn meta(&self) -> Option<&Value> {
        self.spec().and_then(|spec| spec.meta.as_ref())
    }

    /// Planned length as the session controller reads it. Milliseconds win over
    /// every seconds field; a zero millisecond value falls through to them.
    /// `None` means the segment is advanced by hand only.
    pub fn planned_duration_ms(&self) -> Option<u64> {
        match self {
            SegmentInput::Seconds(secs) => seconds_to_ms(*secs),
            SegmentInput::Spec(spec) => spec
                .duration_ms
                .filter(|ms| ms.is_finite() && *ms > 0.0)
                .map(|ms| ms.round() as u64)
                .filter(|ms| *ms > 0)
                .or_else(|| spec.duration_seconds.and_then(seconds_to_ms))
                .or_else(|| spec.duration.and_then(seconds_to_ms))
                .or_else(|| spec.seconds.and_then(seconds_to_ms)),
        }
    }

    /// Countdown length as the scheduler reads it, in seconds. Not validated;
    /// the scheduler discards anything that is not a positive finite number.
    pub fn countdown_secs(&self) -> Option<f64> {
        match self {
            SegmentInput::Seconds(secs) => Some(*secs),
            SegmentInput::Spec(spec) => spec
                .duration
                .or(spec.seconds)
                .or(spec.duration_seconds)
                .or_else(|| spec.duration_ms.map(|ms| ms / 1000.0)),
        }
    }
}

impl From<f64> for SegmentInput {
    fn from(secs: f64) -> Self {
        SegmentInput::Seconds(secs)
    }
}

impl From<SegmentSpec> for SegmentInput {
    fn from(spec: SegmentSpec) -> Self {
        SegmentInput::Spec(spec)
    }
}

fn seconds_to_ms(secs: f64) -> Option<u64> {
    if secs.is_finite() {
        Some((secs * 1000.0).round().max(0.0) as u64)
    } else {
        None
    }
}

pub fn default_segment_id(position: usize) -> String {
    format!("segment-{}", position + 1)
}

pub fn default_segment_name(position: usize) -> String {
    format!("Segment {}", position + 1)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Interrupted,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::InProgress => "in-progress",
            SegmentStatus::Completed => "completed",
            SegmentStatus::Interrupted => "interrupted",
        }
    }
}

/// How a segment is closed out.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentOutcome {
    #[default]
    Completed,
    Interrupted,
}

impl From<SegmentOutcome> for SegmentStatus {
    fn from(outcome: SegmentOutcome) -> Self {
        match outcome {
            SegmentOutcome::Completed => SegmentStatus::Completed,
            SegmentOutcome::Interrupted => SegmentStatus::Interrupted,
        }
    }
}

/// One phase of a session as the controller tracks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub name: String,
    pub planned_duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub status: SegmentStatus,
    pub meta: Value,
}

impl Segment {
    pub fn from_input(position: usize, input: &SegmentInput) -> Self {
        Self {
            id: input
                .id()
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_segment_id(position)),
            name: input
                .name()
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_segment_name(position)),
            planned_duration_ms: input.planned_duration_ms(),
            started_at: None,
            ended_at: None,
            elapsed_ms: 0,
            status: SegmentStatus::Pending,
            meta: input
                .meta()
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.planned_duration_ms, None | Some(0))
    }

    pub(crate) fn clear_timing(&mut self) {
        self.started_at = None;
        self.ended_at = None;
        self.elapsed_ms = 0;
        self.status = SegmentStatus::Pending;
    }
}
