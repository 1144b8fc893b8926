//! Control surface tying the registry, injection pipeline and monitor
//! together.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::monitor::SessionMonitor;
use super::registry::SessionRegistry;
use crate::artifacts::ArtifactSink;
use crate::bus::MessageBus;
use crate::config::AutomationConfig;
use crate::injection::{InjectionOutcome, InjectionPipeline};
use crate::models::session::{ChatSession, SessionStatusView};
use crate::{AppError, Result};

const INJECTION_EXHAUSTED: &str = "all injection strategies failed";

/// Orchestrates chat sessions against the external application.
pub struct Orchestrator {
    config: Arc<AutomationConfig>,
    registry: Arc<SessionRegistry>,
    pipeline: Arc<InjectionPipeline>,
    monitor: Arc<SessionMonitor>,
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        config: Arc<AutomationConfig>,
        bus: Arc<dyn MessageBus>,
        pipeline: InjectionPipeline,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let pipeline = Arc::new(pipeline);
        let monitor = Arc::new(SessionMonitor::new(
            Arc::clone(&registry),
            bus,
            Arc::clone(&pipeline),
            sink,
            Arc::clone(&config),
        ));
        Self {
            config,
            registry,
            pipeline,
            monitor,
        }
    }

    /// Configuration snapshot in use.
    #[must_use]
    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Monitor driving the session state machine.
    #[must_use]
    pub fn monitor_handle(&self) -> Arc<SessionMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Create a running session for `role` carrying `payload`.
    pub fn create(&self, role: &str, payload: &str) -> String {
        let id = self.registry.create(role, payload);
        info!(session_id = %id, role, chars = payload.len(), "session created");
        id
    }

    /// Deliver a session's prompt through the full fallback chain.
    ///
    /// Success marks activity on the session; exhaustion records an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown id, or
    /// `AppError::InvalidTransition` if the session is no longer running.
    pub async fn inject(&self, id: &str) -> Result<InjectionOutcome> {
        let session = self.registry.get(id)?;
        if session.status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "session {id} is {}; not injecting",
                session.status
            )));
        }

        let outcome = self.pipeline.deliver(&session).await;

        match &outcome {
            InjectionOutcome::Delivered { .. } => {
                self.registry.touch_activity(id, Utc::now())?;
            }
            InjectionOutcome::Exhausted => {
                let updated = self.registry.record_error(id, INJECTION_EXHAUSTED)?;
                warn!(
                    session_id = id,
                    error_count = updated.error_count,
                    "prompt not delivered; manual setup required"
                );
            }
        }
        Ok(outcome)
    }

    /// Run the monitor loop until [`stop`](Self::stop) is called.
    pub async fn monitor(&self) {
        Arc::clone(&self.monitor).monitor().await;
    }

    /// Stop monitoring and interrupt every running session.
    pub async fn stop(&self) -> Vec<ChatSession> {
        self.monitor.stop().await
    }

    /// Per-session status view.
    #[must_use]
    pub fn status_snapshot(&self) -> Vec<SessionStatusView> {
        self.monitor.status_snapshot(Utc::now())
    }

    /// Number of sessions still running.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.registry.running().len()
    }
}
