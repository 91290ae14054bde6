use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{
    db::Database,
    models::{SessionState, Summary},
};

/// A stored end-of-session summary, keyed by user and session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRecord {
    pub user_id: String,
    pub session_id: String,
    pub scenario_id: Option<String>,
    pub status: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub summary: Summary,
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("invalid stored timestamp '{value}'"))
}

const SELECT_COLUMNS: &str =
    "SELECT user_id, session_id, scenario_id, status, summary, created_at, updated_at FROM transcripts";

fn row_to_record(row: &Row) -> Result<TranscriptRecord> {
    let status: String = row.get("status")?;
    let summary: String = row.get("summary")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(TranscriptRecord {
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        scenario_id: row.get("scenario_id")?,
        status: SessionState::parse(&status)
            .ok_or_else(|| anyhow!("unknown session status '{status}'"))?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
        summary: serde_json::from_str(&summary).context("stored summary is not valid JSON")?,
    })
}

impl Database {
    /// Inserts or replaces the transcript for `(user_id, summary.session_id)`.
    pub async fn save_transcript(&self, user_id: &str, summary: &Summary) -> Result<TranscriptRecord> {
        if user_id.trim().is_empty() {
            bail!("user id is required to save a transcript");
        }
        if summary.session_id.is_empty() {
            bail!("session id is required to save a transcript");
        }

        let user_id = user_id.to_string();
        let summary = summary.clone();
        let serialized =
            serde_json::to_string(&summary).context("failed to serialize session summary")?;
        let now = Utc::now();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO transcripts (user_id, session_id, scenario_id, status, exit_reason, total_duration_ms, message_count, summary, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT (user_id, session_id) DO UPDATE SET
                     scenario_id = excluded.scenario_id,
                     status = excluded.status,
                     exit_reason = excluded.exit_reason,
                     total_duration_ms = excluded.total_duration_ms,
                     message_count = excluded.message_count,
                     summary = excluded.summary,
                     updated_at = excluded.updated_at",
                params![
                    user_id,
                    summary.session_id,
                    summary.scenario_id,
                    summary.status.as_str(),
                    summary.exit_reason,
                    i64::try_from(summary.total_duration_ms).unwrap_or(i64::MAX),
                    i64::try_from(summary.message_count).unwrap_or(i64::MAX),
                    serialized,
                    now.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )
            .with_context(|| format!("failed to save transcript for session {}", summary.session_id))?;

            let record = conn
                .query_row(
                    &format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND session_id = ?2"),
                    params![user_id, summary.session_id],
                    |row| Ok(row_to_record(row)),
                )
                .context("failed to read back saved transcript")??;
            Ok(record)
        })
        .await
    }

    pub async fn get_transcript(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<TranscriptRecord>> {
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND session_id = ?2"),
                params![user_id, session_id],
                |row| Ok(row_to_record(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    /// Newest first. Timestamps are stored at fixed nanosecond precision so text
    /// order matches time order.
    pub async fn list_transcripts(&self, user_id: &str) -> Result<Vec<TranscriptRecord>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY updated_at DESC, session_id ASC"
            ))?;
            let mut rows = stmt.query(params![user_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }

    pub async fn delete_transcript(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM transcripts WHERE user_id = ?1 AND session_id = ?2",
                params![user_id, session_id],
            )?;
            Ok(deleted > 0)
        })
        .await
    }
}
