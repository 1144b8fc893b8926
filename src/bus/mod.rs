//! Message bus client abstraction.
//!
//! The [`MessageBus`] trait is the typed surface the orchestrator consumes
//! from the external coordination bus. Two adapters ship with the crate:
//! [`http::HttpBus`] for a bus reachable over HTTP and
//! [`memory::InMemoryBus`] for single-process runs and tests.
//!
//! Offsets are opaque, monotonically increasing cursors. [`read_channel`]
//! owns the rule for deriving the next offset when the bus omits one.

pub mod http;
pub mod memory;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Boxed future returned by [`MessageBus`] methods.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Per-channel suffix for an agent's chat messages.
pub const MESSAGES_SUFFIX: &str = "_messages";

/// Per-channel suffix for an agent's status reports.
pub const STATUS_SUFFIX: &str = "_status";

/// Channel carrying `role`'s chat messages.
#[must_use]
pub fn messages_channel(role: &str) -> String {
    format!("{role}{MESSAGES_SUFFIX}")
}

/// Channel carrying `role`'s status reports.
#[must_use]
pub fn status_channel(role: &str) -> String {
    format!("{role}{STATUS_SUFFIX}")
}

/// A single item pulled from a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusItem {
    /// Bus-assigned position, when the bus reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Posting agent, when the bus reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub body: Value,
}

impl BusItem {
    /// Item carrying only a body.
    #[must_use]
    pub fn with_body(body: Value) -> Self {
        Self {
            id: None,
            sender: None,
            body,
        }
    }

    /// Body coerced to a comparable string.
    ///
    /// JSON strings compare by their content; everything else by its
    /// compact JSON rendering.
    #[must_use]
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Raw response to a `pull` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PullResponse {
    /// Items strictly after the requested offset, in arrival order.
    #[serde(default)]
    pub items: Vec<BusItem>,
    /// Offset to pass as `since` on the next pull, if the bus supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<u64>,
}

/// Items read from one channel together with the resolved next offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBatch {
    /// Channel that was read.
    pub channel: String,
    /// Offset the read started after.
    pub since: u64,
    /// Offset to store for the next read.
    pub next: u64,
    /// Items read, in arrival order.
    pub items: Vec<BusItem>,
}

/// Typed client for the external message bus.
///
/// Implementations bound every call with their own timeout and must not
/// block waiting for a consumer.
pub trait MessageBus: Send + Sync {
    /// Register `agent` as a participant on `channels`, returning its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bus` if the bus rejects or cannot serve the call.
    fn register<'a>(&'a self, agent: &'a str, channels: &'a [String]) -> BusFuture<'a, String>;

    /// Post `body` to `channel` on behalf of `sender`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bus` if the bus rejects or cannot serve the call.
    fn post<'a>(&'a self, channel: &'a str, sender: &'a str, body: Value) -> BusFuture<'a, ()>;

    /// Pull up to `limit` items strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bus` if the bus rejects or cannot serve the call.
    fn pull<'a>(&'a self, channel: &'a str, since: u64, limit: usize)
        -> BusFuture<'a, PullResponse>;

    /// List known channel names.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bus` if the bus rejects or cannot serve the call.
    fn list_channels(&self) -> BusFuture<'_, Vec<String>>;
}

/// Resolve the offset following a pull.
///
/// Uses the bus-supplied `next` when present, otherwise `since + items`,
/// which guarantees forward progress whenever items were returned.
#[must_use]
pub fn next_offset(since: u64, response: &PullResponse) -> u64 {
    response
        .next
        .unwrap_or_else(|| since.saturating_add(response.items.len() as u64))
}

/// Pull new items from `channel` and resolve the next offset.
///
/// # Errors
///
/// Propagates any error from [`MessageBus::pull`].
pub async fn read_channel(
    bus: &dyn MessageBus,
    channel: &str,
    since: u64,
    limit: usize,
) -> Result<ChannelBatch> {
    let response = bus.pull(channel, since, limit).await?;
    let next = next_offset(since, &response);
    Ok(ChannelBatch {
        channel: channel.to_owned(),
        since,
        next,
        items: response.items,
    })
}
