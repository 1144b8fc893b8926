//! Persistence boundary for session summaries and manual-setup files.
//!
//! Provides the [`ArtifactSink`] trait. [`FileArtifactWriter`] writes plain
//! files next to the operator, [`crate::persistence::summary_repo::SqliteSummaryStore`]
//! keeps summaries queryable, and [`FanoutSink`] combines several sinks.

pub mod writer;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::warn;

use crate::models::summary::{ManualInstruction, SessionSummary};
use crate::Result;

pub use writer::FileArtifactWriter;

/// Boxed future returned by [`ArtifactSink`] methods.
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Receives records produced by the orchestrator.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`Arc`].
pub trait ArtifactSink: Send + Sync {
    /// Persist the summary of a session that reached a terminal status.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn record_summary<'a>(&'a self, summary: &'a SessionSummary) -> SinkFuture<'a>;

    /// Persist instructions for delivering a payload by hand.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn record_manual_instructions<'a>(
        &'a self,
        instruction: &'a ManualInstruction,
    ) -> SinkFuture<'a>;
}

/// Forwards every record to all inner sinks.
///
/// A failing sink is logged; the remaining sinks still receive the record.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ArtifactSink>>,
}

impl FanoutSink {
    /// Combine `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn ArtifactSink>>) -> Self {
        Self { sinks }
    }

    /// Number of inner sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no inner sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ArtifactSink for FanoutSink {
    fn record_summary<'a>(&'a self, summary: &'a SessionSummary) -> SinkFuture<'a> {
        Box::pin(async move {
            let results = join_all(self.sinks.iter().map(|s| s.record_summary(summary))).await;
            for err in results.into_iter().filter_map(Result::err) {
                warn!(%err, session_id = %summary.session_id, "summary sink failed");
            }
            Ok(())
        })
    }

    fn record_manual_instructions<'a>(
        &'a self,
        instruction: &'a ManualInstruction,
    ) -> SinkFuture<'a> {
        Box::pin(async move {
            let results = join_all(
                self.sinks
                    .iter()
                    .map(|s| s.record_manual_instructions(instruction)),
            )
            .await;
            for err in results.into_iter().filter_map(Result::err) {
                warn!(%err, session_id = %instruction.session_id, "manual instruction sink failed");
            }
            Ok(())
        })
    }
}
