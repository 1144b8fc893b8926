//! Offset-tracked reads of a session's bus channels.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::registry::SessionRegistry;
use crate::bus::{read_channel, BusItem, MessageBus};
use crate::models::session::ChatSession;

/// Maximum items pulled per channel per cycle.
pub const PULL_LIMIT: usize = 5;

/// Pull new items on `channel` for `session` and record them in `registry`.
///
/// The stored offset advances whether or not the caller finds anything of
/// interest in the items. Bus failures are logged and read as an empty
/// batch so a transient outage never fails the session.
pub async fn consume(
    bus: &dyn MessageBus,
    registry: &SessionRegistry,
    session: &ChatSession,
    channel: &str,
    now: DateTime<Utc>,
) -> Vec<BusItem> {
    let since = session.offset_for(channel);
    let batch = match read_channel(bus, channel, since, PULL_LIMIT).await {
        Ok(batch) => batch,
        Err(err) => {
            warn!(session_id = %session.id, channel, %err, "bus read failed; skipping this cycle");
            return Vec::new();
        }
    };

    debug!(
        session_id = %session.id,
        channel,
        since,
        next = batch.next,
        items = batch.items.len(),
        "channel read"
    );

    if let Err(err) = registry.record_batch(&session.id, &batch, now) {
        warn!(session_id = %session.id, channel, %err, "could not record channel read");
    }
    batch.items
}
