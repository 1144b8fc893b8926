//! Ordered fallback delivery with a manual-instruction escape hatch.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{DeliveryStrategy, Platform, StrategyKind};
use crate::artifacts::ArtifactSink;
use crate::models::session::ChatSession;
use crate::models::summary::ManualInstruction;

/// Result of running the full fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionOutcome {
    /// A strategy reported success.
    Delivered {
        /// Name of the strategy that succeeded.
        strategy: String,
    },
    /// Every strategy failed; manual instructions were emitted.
    Exhausted,
}

impl InjectionOutcome {
    /// Whether the payload was delivered.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Runs delivery strategies in order until one succeeds.
pub struct InjectionPipeline {
    strategies: Vec<Arc<dyn DeliveryStrategy>>,
    platform: Platform,
    sink: Arc<dyn ArtifactSink>,
    strategy_timeout: Duration,
}

impl InjectionPipeline {
    /// Build a pipeline over `strategies`, tried in the given order.
    #[must_use]
    pub fn new(
        strategies: Vec<Arc<dyn DeliveryStrategy>>,
        platform: Platform,
        sink: Arc<dyn ArtifactSink>,
        strategy_timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            platform,
            sink,
            strategy_timeout,
        }
    }

    /// Strategy names in delivery order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Deliver `session`'s prompt through the full fallback chain.
    ///
    /// Stops at the first success. A successful file fallback, or the
    /// exhaustion of every strategy, also emits manual instructions.
    pub async fn deliver(&self, session: &ChatSession) -> InjectionOutcome {
        let span = info_span!("inject", session_id = %session.id, role = %session.role);
        async {
            info!(
                chars = session.prompt_payload.len(),
                "injecting prompt"
            );

            for strategy in &self.strategies {
                if !self.attempt(strategy.as_ref(), &session.prompt_payload).await {
                    continue;
                }
                info!(strategy = strategy.name(), "prompt delivered");
                if strategy.kind() == StrategyKind::FileFallback {
                    self.emit_manual_instructions(session).await;
                }
                return InjectionOutcome::Delivered {
                    strategy: strategy.name().to_owned(),
                };
            }

            error!("all injection strategies failed");
            self.emit_manual_instructions(session).await;
            InjectionOutcome::Exhausted
        }
        .instrument(span)
        .await
    }

    /// Deliver `payload` through the platform's clipboard strategy alone,
    /// or the file fallback when the platform has none.
    ///
    /// Used for loop-breaker interventions; never emits manual instructions.
    pub async fn deliver_simple(&self, payload: &str) -> bool {
        let wanted = self
            .platform
            .clipboard_kind()
            .unwrap_or(StrategyKind::FileFallback);

        let Some(strategy) = self.strategies.iter().find(|s| s.kind() == wanted) else {
            warn!(kind = %wanted, "no strategy available for simplified injection");
            return false;
        };

        self.attempt(strategy.as_ref(), payload).await
    }

    async fn attempt(&self, strategy: &dyn DeliveryStrategy, payload: &str) -> bool {
        debug!(strategy = strategy.name(), "trying strategy");
        match tokio::time::timeout(self.strategy_timeout, strategy.deliver(payload)).await {
            Ok(Ok(delivered)) => delivered,
            Ok(Err(err)) => {
                warn!(strategy = strategy.name(), %err, "strategy failed");
                false
            }
            Err(_) => {
                warn!(
                    strategy = strategy.name(),
                    timeout = ?self.strategy_timeout,
                    "strategy timed out"
                );
                false
            }
        }
    }

    async fn emit_manual_instructions(&self, session: &ChatSession) {
        let instruction = ManualInstruction::for_session(session, Utc::now());
        if let Err(err) = self.sink.record_manual_instructions(&instruction).await {
            warn!(%err, "failed to write manual instructions");
        }
    }
}
