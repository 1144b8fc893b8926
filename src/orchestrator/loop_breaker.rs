//! Corrective payload injected when a session repeats itself.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::models::session::ChatSession;

/// Render the loop-breaker prompt for `session` as of `now`.
#[must_use]
pub fn loop_breaker_payload(session: &ChatSession, now: DateTime<Utc>) -> String {
    let runtime = session.runtime_seconds(now);
    let mut out = String::new();
    let _ = writeln!(out, "LOOP DETECTION ALERT - Session: {}", session.id);
    out.push('\n');
    out.push_str("Current status:\n");
    let _ = writeln!(out, "- Role: {}", session.role);
    let _ = writeln!(
        out,
        "- Runtime: {runtime:.1} seconds ({:.1} minutes)",
        runtime / 60.0
    );
    let _ = writeln!(out, "- Message count: {}", session.message_count);
    let _ = writeln!(out, "- Error count: {}", session.error_count);
    let _ = writeln!(
        out,
        "- Last activity: {:.1} seconds ago",
        session.inactive_seconds(now)
    );
    out.push_str(
        "\nRequired actions:\n\
         1. STOP the current approach; it is not working\n\
         2. SUMMARIZE what you have tried so far\n\
         3. IDENTIFY the specific blocking issue\n\
         4. PROPOSE a completely different strategy\n\
         5. If genuinely stuck, respond with [[NEEDS-HUMAN-REVIEW]]\n\
         \n\
         Break this loop by changing your strategy now.\n",
    );
    out
}
