//! Interval-driven control loop over running sessions.
//!
//! Each cycle snapshots the running sessions, evaluates them outside the
//! registry lock and applies at most one terminal transition per session.
//! Evaluation order is fixed: inactivity timeout, then repetition, then
//! completion. The first match wins.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::completion_detector::CompletionDetector;
use super::loop_breaker::loop_breaker_payload;
use super::loop_detector::LoopDetector;
use super::registry::SessionRegistry;
use crate::artifacts::ArtifactSink;
use crate::bus::MessageBus;
use crate::config::AutomationConfig;
use crate::injection::InjectionPipeline;
use crate::models::session::{ChatSession, SessionStatus, SessionStatusView};
use crate::models::summary::SessionSummary;
use crate::AppError;

/// Pause after a cycle dies unexpectedly.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

const LOOP_DETECTED: &str = "loop detected and intervention applied";
const LOOP_BREAKER_FAILED: &str = "loop detected; loop-breaker delivery failed";

/// What one monitor cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: u64,
    /// Running sessions evaluated.
    pub evaluated: usize,
    /// Sessions that reached a terminal status, with that status.
    pub transitions: Vec<(String, SessionStatus)>,
}

/// Drives the session state machine on a fixed interval.
pub struct SessionMonitor {
    registry: Arc<SessionRegistry>,
    loop_detector: LoopDetector,
    completion_detector: CompletionDetector,
    pipeline: Arc<InjectionPipeline>,
    sink: Arc<dyn ArtifactSink>,
    config: Arc<AutomationConfig>,
    cancel: CancellationToken,
    cycles: AtomicU64,
}

impl SessionMonitor {
    /// Build a monitor over `registry` reading from `bus`.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        bus: Arc<dyn MessageBus>,
        pipeline: Arc<InjectionPipeline>,
        sink: Arc<dyn ArtifactSink>,
        config: Arc<AutomationConfig>,
    ) -> Self {
        Self {
            registry,
            loop_detector: LoopDetector::new(Arc::clone(&bus), config.loop_detection_threshold),
            completion_detector: CompletionDetector::new(bus),
            pipeline,
            sink,
            config,
            cancel: CancellationToken::new(),
            cycles: AtomicU64::new(0),
        }
    }

    /// Token that stops [`monitor`](Self::monitor) at the next cycle boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cycles completed so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Run cycles on the poll interval until stopped.
    ///
    /// Cancellation is checked between cycles; a cycle in flight runs to
    /// completion. A cycle that panics is logged and followed by a short
    /// back-off. Sessions still running on exit become `interrupted`.
    pub async fn monitor(self: Arc<Self>) {
        info!(
            poll_interval = ?self.config.poll_interval(),
            inactivity_timeout = ?self.config.inactivity_timeout(),
            "session monitoring started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let this = Arc::clone(&self);
            let cycle = tokio::spawn(
                async move { this.run_cycle_at(Utc::now()).await }
                    .instrument(info_span!("monitor_cycle")),
            );
            if let Err(err) = cycle.await {
                error!(%err, "monitor cycle failed");
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }

        self.interrupt_all(Utc::now()).await;
        info!(cycles = self.cycles(), "session monitoring stopped");
    }

    /// Signal the loop to stop and interrupt every running session.
    ///
    /// Returns the sessions that were interrupted by this call.
    pub async fn stop(&self) -> Vec<ChatSession> {
        info!("stopping session monitoring");
        self.cancel.cancel();
        self.interrupt_all(Utc::now()).await
    }

    /// Evaluate every running session once, as of `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let running = self.registry.running();
        let outcomes = join_all(running.iter().map(|session| {
            self.evaluate(session, now).instrument(info_span!(
                "evaluate",
                session_id = %session.id,
                role = %session.role
            ))
        }))
        .await;

        let transitions = running
            .iter()
            .zip(outcomes)
            .filter_map(|(session, outcome)| outcome.map(|status| (session.id.clone(), status)))
            .collect();

        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.config.status_log_every;
        if every > 0 && cycle % every == 0 {
            self.log_status(cycle, now);
        }

        CycleReport {
            cycle,
            evaluated: running.len(),
            transitions,
        }
    }

    /// Per-session view of every registered session as of `now`.
    #[must_use]
    pub fn status_snapshot(&self, now: DateTime<Utc>) -> Vec<SessionStatusView> {
        self.registry
            .list()
            .iter()
            .map(|session| SessionStatusView::from_session(session, now))
            .collect()
    }

    async fn evaluate(&self, session: &ChatSession, now: DateTime<Utc>) -> Option<SessionStatus> {
        let inactive = session.inactive_seconds(now);
        #[allow(clippy::cast_precision_loss)] // Timeouts are far below f64 precision limits.
        let timeout = self.config.inactivity_timeout_seconds as f64;

        if inactive > timeout {
            warn!(inactive_seconds = inactive, "session timed out");
            return self.finish(&session.id, SessionStatus::Timeout, now, |_| {}).await;
        }

        if self.loop_detector.detect(&self.registry, session, now).await {
            return self.handle_loop(session, now).await;
        }

        if self
            .completion_detector
            .detect(&self.registry, session, now)
            .await
        {
            info!("session completed");
            return self
                .finish(&session.id, SessionStatus::Completed, now, |_| {})
                .await;
        }

        None
    }

    async fn handle_loop(&self, session: &ChatSession, now: DateTime<Utc>) -> Option<SessionStatus> {
        // Counters as of detection feed the breaker text; inactivity is
        // measured from before this cycle's bus read.
        let mut current = self.registry.get(&session.id).unwrap_or_else(|_| session.clone());
        current.last_activity_at = session.last_activity_at;
        let payload = loop_breaker_payload(&current, now);

        let looped = match self.registry.transition(&session.id, SessionStatus::Looped, |s| {
            s.loop_detected = true;
            s.error_count += 1;
            s.last_error = Some(LOOP_DETECTED.to_owned());
        }) {
            Ok(looped) => looped,
            Err(err) => {
                skip_transition(&session.id, &err);
                return None;
            }
        };
        warn!(error_count = looped.error_count, "loop detected; injecting loop breaker");

        let settled = if self.pipeline.deliver_simple(&payload).await {
            info!("loop breaker delivered");
            self.registry.touch_activity(&session.id, now)
        } else {
            warn!("loop breaker delivery failed");
            self.registry.set_last_error(&session.id, LOOP_BREAKER_FAILED)
        };

        let settled = settled.unwrap_or(looped);
        self.emit_summary(&settled, now).await;
        Some(SessionStatus::Looped)
    }

    async fn finish<F>(
        &self,
        id: &str,
        status: SessionStatus,
        now: DateTime<Utc>,
        apply: F,
    ) -> Option<SessionStatus>
    where
        F: FnOnce(&mut ChatSession),
    {
        match self.registry.transition(id, status, apply) {
            Ok(session) => {
                self.emit_summary(&session, now).await;
                Some(status)
            }
            Err(err) => {
                skip_transition(id, &err);
                None
            }
        }
    }

    async fn interrupt_all(&self, now: DateTime<Utc>) -> Vec<ChatSession> {
        let interrupted = self.registry.interrupt_running();
        for session in &interrupted {
            info!(session_id = %session.id, "session interrupted");
            self.emit_summary(session, now).await;
        }
        interrupted
    }

    async fn emit_summary(&self, session: &ChatSession, now: DateTime<Utc>) {
        let summary = SessionSummary::from_session(session, now);
        info!(
            session_id = %summary.session_id,
            status = %summary.status,
            runtime_seconds = summary.runtime_seconds,
            message_count = summary.message_count,
            error_count = summary.error_count,
            "session finished"
        );
        if let Err(err) = self.sink.record_summary(&summary).await {
            warn!(session_id = %summary.session_id, %err, "failed to record session summary");
        }
    }

    fn log_status(&self, cycle: u64, now: DateTime<Utc>) {
        let sessions = self.registry.list();
        let count = |status: SessionStatus| sessions.iter().filter(|s| s.status == status).count();
        info!(
            cycle,
            total = sessions.len(),
            running = count(SessionStatus::Running),
            completed = count(SessionStatus::Completed),
            looped = count(SessionStatus::Looped),
            timeout = count(SessionStatus::Timeout),
            interrupted = count(SessionStatus::Interrupted),
            "monitor status"
        );
        for session in sessions.iter().filter(|s| s.status == SessionStatus::Running) {
            info!(
                session_id = %session.id,
                runtime_seconds = session.runtime_seconds(now),
                inactive_seconds = session.inactive_seconds(now),
                error_count = session.error_count,
                "running session"
            );
        }
    }
}

fn skip_transition(id: &str, err: &AppError) {
    match err {
        AppError::InvalidTransition(_) => {
            debug!(session_id = id, %err, "session already settled; skipping");
        }
        _ => warn!(session_id = id, %err, "could not apply transition"),
    }
}
