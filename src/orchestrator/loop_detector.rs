//! Repetition detection over a session's message channel.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::channel_reader::consume;
use super::registry::SessionRegistry;
use crate::bus::{messages_channel, BusItem, MessageBus};
use crate::models::session::ChatSession;

/// Number of trailing items compared when looking for repetition.
pub const LOOP_WINDOW: usize = 3;

/// Whether a freshly read batch shows the agent repeating itself.
///
/// The batch must hold at least `threshold` items, and its last
/// [`LOOP_WINDOW`] bodies must share a single value.
#[must_use]
pub fn is_looping(items: &[BusItem], threshold: usize) -> bool {
    if items.is_empty() || items.len() < threshold {
        return false;
    }
    let window = &items[items.len().saturating_sub(LOOP_WINDOW)..];
    let distinct: HashSet<String> = window.iter().map(BusItem::body_text).collect();
    distinct.len() <= 1
}

/// Reads `<role>_messages` and applies [`is_looping`].
pub struct LoopDetector {
    bus: Arc<dyn MessageBus>,
    threshold: usize,
}

impl LoopDetector {
    /// Create a detector declaring loops at `threshold` new items.
    #[must_use]
    pub fn new(bus: Arc<dyn MessageBus>, threshold: usize) -> Self {
        Self { bus, threshold }
    }

    /// Consume new messages for `session` and report whether it loops.
    ///
    /// Bus errors count as "no loop this cycle".
    pub async fn detect(
        &self,
        registry: &SessionRegistry,
        session: &ChatSession,
        now: DateTime<Utc>,
    ) -> bool {
        let channel = messages_channel(&session.role);
        let items = consume(self.bus.as_ref(), registry, session, &channel, now).await;
        let looping = is_looping(&items, self.threshold);
        if looping {
            let recent: Vec<String> = items
                .iter()
                .rev()
                .take(LOOP_WINDOW)
                .map(BusItem::body_text)
                .collect();
            debug!(session_id = %session.id, ?recent, "repetition found");
        }
        looping
    }
}
