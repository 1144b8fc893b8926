//! Session summary repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::artifacts::{ArtifactSink, SinkFuture};
use crate::models::session::SessionStatus;
use crate::models::summary::{ManualInstruction, SessionSummary};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for session summary records.
#[derive(Clone)]
pub struct SqliteSummaryStore {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SummaryRow {
    session_id: String,
    role: String,
    status: String,
    started_at: String,
    ended_at: String,
    runtime_seconds: f64,
    last_activity_at: String,
    message_count: i64,
    loop_detected: bool,
    error_count: i64,
    last_error: Option<String>,
    payload_length: i64,
}

impl SummaryRow {
    /// Convert a database row into the domain model.
    fn into_summary(self) -> Result<SessionSummary> {
        Ok(SessionSummary {
            session_id: self.session_id,
            role: self.role,
            status: parse_status(&self.status)?,
            started_at: parse_time("started_at", &self.started_at)?,
            ended_at: parse_time("ended_at", &self.ended_at)?,
            runtime_seconds: self.runtime_seconds,
            last_activity_at: parse_time("last_activity_at", &self.last_activity_at)?,
            message_count: to_unsigned("message_count", self.message_count)?,
            loop_detected: self.loop_detected,
            error_count: to_unsigned("error_count", self.error_count)?,
            last_error: self.last_error,
            payload_length: usize::try_from(self.payload_length)
                .map_err(|e| AppError::Db(format!("invalid payload_length: {e}")))?,
        })
    }
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn to_unsigned(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn to_signed(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|e| AppError::Db(format!("{field} out of range: {e}")))
}

fn parse_status(s: &str) -> Result<SessionStatus> {
    match s {
        "running" => Ok(SessionStatus::Running),
        "completed" => Ok(SessionStatus::Completed),
        "failed" => Ok(SessionStatus::Failed),
        "looped" => Ok(SessionStatus::Looped),
        "timeout" => Ok(SessionStatus::Timeout),
        "interrupted" => Ok(SessionStatus::Interrupted),
        other => Err(AppError::Db(format!("invalid session status: {other}"))),
    }
}

impl SqliteSummaryStore {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a summary, replacing any earlier record for the same
    /// session and status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn insert(&self, summary: &SessionSummary) -> Result<()> {
        let payload_length = i64::try_from(summary.payload_length)
            .map_err(|e| AppError::Db(format!("payload_length out of range: {e}")))?;

        sqlx::query(
            "INSERT OR REPLACE INTO session_summary (session_id, role, status, started_at,
             ended_at, runtime_seconds, last_activity_at, message_count, loop_detected,
             error_count, last_error, payload_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&summary.session_id)
        .bind(&summary.role)
        .bind(summary.status.as_str())
        .bind(summary.started_at.to_rfc3339())
        .bind(summary.ended_at.to_rfc3339())
        .bind(summary.runtime_seconds)
        .bind(summary.last_activity_at.to_rfc3339())
        .bind(to_signed("message_count", summary.message_count)?)
        .bind(summary.loop_detected)
        .bind(to_signed("error_count", summary.error_count)?)
        .bind(&summary.last_error)
        .bind(payload_length)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Retrieve all summaries recorded for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT * FROM session_summary WHERE session_id = ?1 ORDER BY ended_at",
        )
        .bind(session_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// List summaries with the given terminal status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_status(&self, status: SessionStatus) -> Result<Vec<SessionSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT * FROM session_summary WHERE status = ?1 ORDER BY ended_at",
        )
        .bind(status.as_str())
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    /// Count all stored summaries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session_summary")
            .fetch_one(self.db.as_ref())
            .await?;
        to_unsigned("count", row.0)
    }
}

impl ArtifactSink for SqliteSummaryStore {
    fn record_summary<'a>(&'a self, summary: &'a SessionSummary) -> SinkFuture<'a> {
        Box::pin(self.insert(summary))
    }

    fn record_manual_instructions<'a>(
        &'a self,
        instruction: &'a ManualInstruction,
    ) -> SinkFuture<'a> {
        Box::pin(async move {
            debug!(session_id = %instruction.session_id, "manual instructions are not stored in sqlite");
            Ok(())
        })
    }
}
