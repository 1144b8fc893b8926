//! Chat session model and lifecycle helpers.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for a chat session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is being monitored.
    Running,
    /// Agent signalled `done` on its status channel.
    Completed,
    /// Session failed outright.
    Failed,
    /// Agent repeated itself; a loop-breaker was injected.
    Looped,
    /// No activity within the inactivity timeout.
    Timeout,
    /// Monitoring stopped while the session was still running.
    Interrupted,
}

impl SessionStatus {
    /// Whether no further automatic transitions may occur.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Stable lowercase name used in artifacts and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Looped => "looped",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One orchestrated agent chat bound to a role and a prompt payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChatSession {
    /// Unique, sortable identifier (`<role>_<random>_<unix seconds>`).
    pub id: String,
    /// Logical agent identity; any string is valid.
    pub role: String,
    /// Payload delivered into the chat; immutable after creation.
    pub prompt_payload: String,
    /// Creation timestamp.
    pub started_at: DateTime<Utc>,
    /// Advanced only by bus activity or a successful intervention.
    pub last_activity_at: DateTime<Utc>,
    /// Bus items consumed across all channels.
    pub message_count: u64,
    /// Session-level errors recorded so far.
    pub error_count: u64,
    /// Last consumed offset per bus channel.
    pub last_offset_per_channel: HashMap<String, u64>,
    /// Sticky once set.
    pub loop_detected: bool,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Most recent diagnostic message.
    pub last_error: Option<String>,
}

impl ChatSession {
    /// Construct a running session with a generated identifier.
    #[must_use]
    pub fn new(role: String, prompt_payload: String, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_session_id(&role, now),
            role,
            prompt_payload,
            started_at: now,
            last_activity_at: now,
            message_count: 0,
            error_count: 0,
            last_offset_per_channel: HashMap::new(),
            loop_detected: false,
            status: SessionStatus::Running,
            last_error: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// Only `running` may move, and only to a terminal status.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        self.status == SessionStatus::Running && next.is_terminal()
    }

    /// Stored offset for `channel`, defaulting to zero.
    #[must_use]
    pub fn offset_for(&self, channel: &str) -> u64 {
        self.last_offset_per_channel
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Advance the stored offset for `channel`; never moves backwards.
    pub fn advance_offset(&mut self, channel: &str, next: u64) {
        let entry = self
            .last_offset_per_channel
            .entry(channel.to_owned())
            .or_insert(0);
        if next > *entry {
            *entry = next;
        }
    }

    /// Seconds since the session started, as of `now`.
    #[must_use]
    pub fn runtime_seconds(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.started_at, now)
    }

    /// Seconds since the last recorded activity, as of `now`.
    #[must_use]
    pub fn inactive_seconds(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.last_activity_at, now)
    }
}

/// Build a session id from the role, a random component and a timestamp.
#[must_use]
pub fn generate_session_id(role: &str, now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{role}_{}_{}", &random[..8], now.timestamp())
}

#[allow(clippy::cast_precision_loss)] // Millisecond precision is ample for reporting.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Point-in-time view of a session for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct SessionStatusView {
    /// Session identifier.
    pub id: String,
    /// Logical role.
    pub role: String,
    /// Current status.
    pub status: SessionStatus,
    /// Seconds since start.
    pub runtime_seconds: f64,
    /// Seconds since last activity.
    pub inactive_seconds: f64,
    /// Bus items consumed.
    pub message_count: u64,
    /// Errors recorded.
    pub error_count: u64,
    /// Whether a loop was ever detected.
    pub loop_detected: bool,
}

impl SessionStatusView {
    /// Project a session into a status view as of `now`.
    #[must_use]
    pub fn from_session(session: &ChatSession, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id.clone(),
            role: session.role.clone(),
            status: session.status,
            runtime_seconds: session.runtime_seconds(now),
            inactive_seconds: session.inactive_seconds(now),
            message_count: session.message_count,
            error_count: session.error_count,
            loop_detected: session.loop_detected,
        }
    }
}
