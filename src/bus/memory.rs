//! In-process message bus.
//!
//! Keeps an append-only log per channel with 1-based item positions.
//! Used when no external bus URL is configured and as the bus double in
//! tests, where [`InMemoryBus::fail_next_pulls`] simulates outages.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{BusFuture, BusItem, MessageBus, PullResponse};
use crate::AppError;

#[derive(Default)]
struct BusState {
    channels: BTreeMap<String, Vec<BusItem>>,
    agents: HashMap<String, Vec<String>>,
}

/// Message bus held entirely in memory.
pub struct InMemoryBus {
    state: Mutex<BusState>,
    report_next: AtomicBool,
    failing_pulls: AtomicUsize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Empty bus that reports `next` offsets on every pull.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            report_next: AtomicBool::new(true),
            failing_pulls: AtomicUsize::new(0),
        }
    }

    /// Toggle whether pull responses carry an explicit `next` offset.
    pub fn set_report_next(&self, enabled: bool) {
        self.report_next.store(enabled, Ordering::SeqCst);
    }

    /// Make the next `count` pulls fail with `AppError::Bus`.
    pub fn fail_next_pulls(&self, count: usize) {
        self.failing_pulls.store(count, Ordering::SeqCst);
    }

    /// Append `body` to `channel` without a sender.
    pub fn push(&self, channel: &str, body: Value) {
        self.append(channel, None, body);
    }

    /// Number of items ever posted to `channel`.
    #[must_use]
    pub fn len(&self, channel: &str) -> usize {
        self.lock().channels.get(channel).map_or(0, Vec::len)
    }

    /// Whether no channel holds any item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().channels.values().all(Vec::is_empty)
    }

    /// Channels `agent` registered for, if it registered.
    #[must_use]
    pub fn registration(&self, agent: &str) -> Option<Vec<String>> {
        self.lock().agents.get(agent).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, channel: &str, sender: Option<String>, body: Value) {
        let mut state = self.lock();
        let log = state.channels.entry(channel.to_owned()).or_default();
        let id = log.len() as u64 + 1;
        log.push(BusItem {
            id: Some(id),
            sender,
            body,
        });
    }

    fn take_failure(&self) -> bool {
        self.failing_pulls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl MessageBus for InMemoryBus {
    fn register<'a>(&'a self, agent: &'a str, channels: &'a [String]) -> BusFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.lock();
            for channel in channels {
                state.channels.entry(channel.clone()).or_default();
            }
            state.agents.insert(agent.to_owned(), channels.to_vec());
            let agent_id = format!("{agent}_{}", Uuid::new_v4().simple());
            debug!(agent, agent_id, "agent registered on in-memory bus");
            Ok(agent_id)
        })
    }

    fn post<'a>(&'a self, channel: &'a str, sender: &'a str, body: Value) -> BusFuture<'a, ()> {
        Box::pin(async move {
            self.append(channel, Some(sender.to_owned()), body);
            Ok(())
        })
    }

    fn pull<'a>(
        &'a self,
        channel: &'a str,
        since: u64,
        limit: usize,
    ) -> BusFuture<'a, PullResponse> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(AppError::Bus(format!("simulated pull failure on {channel}")));
            }

            let state = self.lock();
            let items: Vec<BusItem> = state
                .channels
                .get(channel)
                .map(|log| {
                    log.iter()
                        .filter(|item| item.id.is_some_and(|id| id > since))
                        .take(limit)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let next = if self.report_next.load(Ordering::SeqCst) {
                Some(items.last().and_then(|item| item.id).unwrap_or(since))
            } else {
                None
            };

            Ok(PullResponse { items, next })
        })
    }

    fn list_channels(&self) -> BusFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.lock().channels.keys().cloned().collect()) })
    }
}
