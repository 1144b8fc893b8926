//! Completion signals from a session's status channel.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::channel_reader::consume;
use super::registry::SessionRegistry;
use crate::bus::{status_channel, BusItem, MessageBus};
use crate::models::session::ChatSession;

/// Whether any item's body is an object with `"done": true`.
///
/// Non-object bodies and objects without a boolean `done` are ignored.
#[must_use]
pub fn signals_done(items: &[BusItem]) -> bool {
    items.iter().any(|item| {
        item.body
            .as_object()
            .and_then(|body| body.get("done"))
            .is_some_and(|done| *done == Value::Bool(true))
    })
}

/// Reads `<role>_status` and applies [`signals_done`].
pub struct CompletionDetector {
    bus: Arc<dyn MessageBus>,
}

impl CompletionDetector {
    /// Create a detector over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Consume new status reports for `session` and report completion.
    pub async fn detect(
        &self,
        registry: &SessionRegistry,
        session: &ChatSession,
        now: DateTime<Utc>,
    ) -> bool {
        let channel = status_channel(&session.role);
        let items = consume(self.bus.as_ref(), registry, session, &channel, now).await;
        signals_done(&items)
    }
}
