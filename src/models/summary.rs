//! Records handed to the persistence boundary when a session ends or
//! needs a human to finish delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{ChatSession, SessionStatus};

/// Final accounting for a session that reached a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Logical role.
    pub role: String,
    /// Terminal status.
    pub status: SessionStatus,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Time the terminal transition was recorded.
    pub ended_at: DateTime<Utc>,
    /// `ended_at - started_at` in seconds.
    pub runtime_seconds: f64,
    /// Last recorded activity.
    pub last_activity_at: DateTime<Utc>,
    /// Bus items consumed.
    pub message_count: u64,
    /// Whether a loop was detected.
    pub loop_detected: bool,
    /// Errors recorded.
    pub error_count: u64,
    /// Most recent diagnostic.
    pub last_error: Option<String>,
    /// Length of the prompt payload in bytes.
    pub payload_length: usize,
}

impl SessionSummary {
    /// Summarize `session` as of `ended_at`.
    #[must_use]
    pub fn from_session(session: &ChatSession, ended_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id.clone(),
            role: session.role.clone(),
            status: session.status,
            started_at: session.started_at,
            ended_at,
            runtime_seconds: session.runtime_seconds(ended_at),
            last_activity_at: session.last_activity_at,
            message_count: session.message_count,
            loop_detected: session.loop_detected,
            error_count: session.error_count,
            last_error: session.last_error.clone(),
            payload_length: session.prompt_payload.len(),
        }
    }
}

/// Human-readable fallback written when automated delivery did not finish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ManualInstruction {
    /// Session the payload belongs to.
    pub session_id: String,
    /// Logical role.
    pub role: String,
    /// Session creation timestamp.
    pub session_started_at: DateTime<Utc>,
    /// Time the instruction was generated.
    pub generated_at: DateTime<Utc>,
    /// Raw payload to paste by hand.
    pub payload: String,
}

impl ManualInstruction {
    /// Build an instruction for delivering `session`'s prompt by hand.
    #[must_use]
    pub fn for_session(session: &ChatSession, generated_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session.id.clone(),
            role: session.role.clone(),
            session_started_at: session.started_at,
            generated_at,
            payload: session.prompt_payload.clone(),
        }
    }

    /// Render the instruction as a plain-text document.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "# Manual Setup Instructions for {id}\n\
             \n\
             ## Session Details\n\
             - ID: {id}\n\
             - Role: {role}\n\
             - Created: {created}\n\
             \n\
             ## Steps\n\
             1. Open the target application\n\
             2. Create a new chat\n\
             3. Copy and paste the prompt below:\n\
             \n\
             ---\n\
             {payload}\n\
             ---\n\
             \n\
             ## Expected Behavior\n\
             The agent should register with the message bus and begin coordination.\n\
             \n\
             Generated at: {generated}\n",
            id = self.session_id,
            role = self.role,
            created = self.session_started_at.to_rfc2822(),
            payload = self.payload,
            generated = self.generated_at.to_rfc2822(),
        )
    }
}
