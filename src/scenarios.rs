//! Scenario manifest: which interview scenarios exist and how each one is paced.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    models::{SegmentInput, SegmentSpec},
    session::SessionConfig,
};

/// Labels for the standard five-phase interview, by position.
pub const SEGMENT_LABELS: [&str; 5] = [
    "Warm-up & Goals",
    "System Design Planning",
    "Deep Dive & Data Flows",
    "Trade-offs & Scaling",
    "Wrap-up & Coaching",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub company_label: Option<String>,
    #[serde(default)]
    pub topic_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub prompt_path: Option<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub takeaways: Vec<String>,
    /// Seconds per segment, in order.
    #[serde(default)]
    pub segment_durations: Vec<f64>,
    #[serde(default)]
    pub default: bool,
}

impl Scenario {
    pub fn label(&self) -> String {
        [self.company_label.as_deref(), self.topic_label.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    pub fn segment_inputs(&self) -> Vec<SegmentInput> {
        self.segment_durations
            .iter()
            .enumerate()
            .map(|(index, seconds)| {
                SegmentInput::Spec(SegmentSpec {
                    id: Some(format!("{}-segment-{}", self.id, index + 1)),
                    name: Some(
                        SEGMENT_LABELS
                            .get(index)
                            .map(|label| label.to_string())
                            .unwrap_or_else(|| format!("Segment {}", index + 1)),
                    ),
                    duration_seconds: Some(*seconds),
                    ..SegmentSpec::default()
                })
            })
            .collect()
    }

    pub fn session_config(&self, now: DateTime<Utc>) -> SessionConfig {
        SessionConfig {
            session_id: Some(format!("{}-{}", self.id, now.timestamp_millis())),
            scenario_id: Some(self.id.clone()),
            segments: self.segment_inputs(),
            metadata: json!({ "scenarioLabel": self.label() }),
        }
    }

    pub fn total_planned_secs(&self) -> f64 {
        self.segment_durations.iter().filter(|secs| **secs > 0.0).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioManifest {
    pub scenarios: Vec<Scenario>,
}

impl ScenarioManifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario manifest {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Invalid scenarios manifest in {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("invalid scenarios manifest")
    }

    pub fn find(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|scenario| scenario.id == id)
    }

    pub fn default_scenario(&self) -> Option<&Scenario> {
        self.scenarios.iter().find(|scenario| scenario.default)
    }

    /// The flagged default, else the first scenario.
    pub fn initial_scenario(&self) -> Option<&Scenario> {
        self.default_scenario().or_else(|| self.scenarios.first())
    }
}
