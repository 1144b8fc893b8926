//! Synchronized owner of every chat session.
//!
//! The registry is the only holder of session state. Callers receive
//! clones; all mutation goes through the methods here, each of which takes
//! the lock for the duration of a map update and nothing longer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::bus::ChannelBatch;
use crate::models::session::{ChatSession, SessionStatus};
use crate::{AppError, Result};

/// Thread-safe map of sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ChatSession>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChatSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new running session and return its id.
    pub fn create(&self, role: &str, prompt_payload: &str) -> String {
        self.create_at(role, prompt_payload, Utc::now())
    }

    /// Register a new running session started at `now`.
    pub fn create_at(&self, role: &str, prompt_payload: &str, now: DateTime<Utc>) -> String {
        let session = ChatSession::new(role.to_owned(), prompt_payload.to_owned(), now);
        let id = session.id.clone();
        self.lock().insert(id.clone(), session);
        debug!(session_id = %id, role, "session registered");
        id
    }

    /// Fetch a copy of one session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn get(&self, id: &str) -> Result<ChatSession> {
        self.lock().get(id).cloned().ok_or_else(|| not_found(id))
    }

    /// Copies of all sessions, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<ChatSession> {
        let mut sessions: Vec<ChatSession> = self.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Copies of the sessions still `running`, ordered by id.
    #[must_use]
    pub fn running(&self) -> Vec<ChatSession> {
        let mut sessions: Vec<ChatSession> = self
            .lock()
            .values()
            .filter(|s| s.status == SessionStatus::Running)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove a session and return it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn remove(&self, id: &str) -> Result<ChatSession> {
        self.lock().remove(id).ok_or_else(|| not_found(id))
    }

    /// Account for items read from a channel.
    ///
    /// Advances the channel offset (never backwards), adds the items to
    /// the message count and, when any were read, marks bus activity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn record_batch(&self, id: &str, batch: &ChannelBatch, now: DateTime<Utc>) -> Result<()> {
        self.update(id, |session| {
            session.advance_offset(&batch.channel, batch.next);
            session.message_count += batch.items.len() as u64;
            if !batch.items.is_empty() && now > session.last_activity_at {
                session.last_activity_at = now;
            }
        })
        .map(drop)
    }

    /// Mark activity on a session at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn touch_activity(&self, id: &str, now: DateTime<Utc>) -> Result<ChatSession> {
        self.update(id, |session| {
            if now > session.last_activity_at {
                session.last_activity_at = now;
            }
        })
    }

    /// Record a session-level error without changing status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn record_error(&self, id: &str, message: &str) -> Result<ChatSession> {
        self.update(id, |session| {
            session.error_count += 1;
            session.last_error = Some(message.to_owned());
        })
    }

    /// Replace the diagnostic message without counting a new error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn set_last_error(&self, id: &str, message: &str) -> Result<ChatSession> {
        self.update(id, |session| session.last_error = Some(message.to_owned()))
    }

    /// Move a session to `next`, applying `apply` in the same critical
    /// section, and return the updated copy.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown, or
    /// `AppError::InvalidTransition` if the session is no longer `running`
    /// or `next` is not terminal.
    pub fn transition<F>(&self, id: &str, next: SessionStatus, apply: F) -> Result<ChatSession>
    where
        F: FnOnce(&mut ChatSession),
    {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id).ok_or_else(|| not_found(id))?;
        if !session.can_transition_to(next) {
            return Err(AppError::InvalidTransition(format!(
                "session {id}: {} -> {next}",
                session.status
            )));
        }
        session.status = next;
        apply(session);
        Ok(session.clone())
    }

    /// Force every running session to `interrupted`, returning the
    /// sessions that changed.
    pub fn interrupt_running(&self) -> Vec<ChatSession> {
        let mut sessions = self.lock();
        let mut interrupted: Vec<ChatSession> = sessions
            .values_mut()
            .filter(|s| s.can_transition_to(SessionStatus::Interrupted))
            .map(|session| {
                session.status = SessionStatus::Interrupted;
                session.clone()
            })
            .collect();
        interrupted.sort_by(|a, b| a.id.cmp(&b.id));
        interrupted
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<ChatSession>
    where
        F: FnOnce(&mut ChatSession),
    {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id).ok_or_else(|| not_found(id))?;
        apply(session);
        Ok(session.clone())
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("session {id} not found"))
}
