//! Human-readable and structured renderings of a session [`Summary`].

use anyhow::{Context, Result};

use crate::models::Summary;

const MISSING: &str = "—";

/// `m:ss`, rounded to the nearest second. `None` renders as a dash.
pub fn format_duration(ms: Option<u64>) -> String {
    let Some(ms) = ms else {
        return MISSING.to_string();
    };
    let total_seconds = (ms as f64 / 1000.0).round() as u64;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn render_markdown(summary: &Summary) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("# Session Summary".into());
    lines.push(String::new());
    lines.push(format!("- **Session ID:** {}", summary.session_id));
    if let Some(scenario_id) = &summary.scenario_id {
        lines.push(format!("- **Scenario:** {scenario_id}"));
    }
    lines.push(format!("- **Status:** {}", summary.status));
    if let Some(reason) = &summary.exit_reason {
        lines.push(format!("- **Exit Reason:** {reason}"));
    }
    lines.push(format!(
        "- **Started:** {}",
        summary
            .started_at
            .map_or_else(|| "Unknown".to_string(), |at| at.to_rfc3339())
    ));
    lines.push(format!("- **Ended:** {}", summary.ended_at.to_rfc3339()));
    lines.push(format!(
        "- **Total Duration:** {}",
        format_duration(Some(summary.total_duration_ms))
    ));
    lines.push(format!("- **Messages:** {}", summary.message_count));
    lines.push(String::new());

    if !summary.timing.segments.is_empty() {
        lines.push("## Segment Timings".into());
        lines.push(String::new());
        lines.push("| Segment | Planned | Actual | Status |".into());
        lines.push("| --- | --- | --- | --- |".into());
        for segment in &summary.timing.segments {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                segment.name,
                format_duration(segment.planned_duration_ms),
                format_duration(Some(segment.elapsed_ms)),
                segment.status.as_str()
            ));
        }
        lines.push(String::new());
    }

    if !summary.chat_log.is_empty() {
        lines.push("## Chat Log".into());
        lines.push(String::new());
        for (index, message) in summary.chat_log.iter().enumerate() {
            lines.push(format!(
                "### {}. {} — {}",
                index + 1,
                message.role,
                message.timestamp.to_rfc3339()
            ));
            lines.push(String::new());
            lines.push(message.content.clone());
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

pub fn render_json(summary: &Summary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize session summary")
}

pub fn export_file_name(summary: &Summary, extension: &str) -> String {
    let stem = if summary.session_id.is_empty() {
        "session"
    } else {
        summary.session_id.as_str()
    };
    format!("{stem}-summary.{extension}")
}
