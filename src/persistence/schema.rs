//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so it is safe to
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS session_summary (
    session_id       TEXT NOT NULL,
    role             TEXT NOT NULL,
    status           TEXT NOT NULL CHECK(status IN ('running','completed','failed','looped','timeout','interrupted')),
    started_at       TEXT NOT NULL,
    ended_at         TEXT NOT NULL,
    runtime_seconds  REAL NOT NULL,
    last_activity_at TEXT NOT NULL,
    message_count    INTEGER NOT NULL DEFAULT 0,
    loop_detected    INTEGER NOT NULL DEFAULT 0,
    error_count      INTEGER NOT NULL DEFAULT 0,
    last_error       TEXT,
    payload_length   INTEGER NOT NULL,
    PRIMARY KEY (session_id, status)
);

CREATE INDEX IF NOT EXISTS idx_summary_status ON session_summary(status);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
