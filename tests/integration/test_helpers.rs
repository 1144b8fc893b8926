//! Shared test doubles for orchestrator-level integration tests.
//!
//! Provides a recording artifact sink, scripted delivery strategies and a
//! harness that wires an [`Orchestrator`] to an in-memory bus so each test
//! can focus on behaviour rather than plumbing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_orchestrator::artifacts::{ArtifactSink, SinkFuture};
use chat_orchestrator::bus::memory::InMemoryBus;
use chat_orchestrator::bus::MessageBus;
use chat_orchestrator::config::AutomationConfig;
use chat_orchestrator::injection::platform::OsFamily;
use chat_orchestrator::injection::{
    DeliveryStrategy, InjectionPipeline, Platform, StrategyFuture, StrategyKind,
};
use chat_orchestrator::models::summary::{ManualInstruction, SessionSummary};
use chat_orchestrator::orchestrator::Orchestrator;
use chat_orchestrator::AppError;

/// Sink that keeps every record in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub summaries: Mutex<Vec<SessionSummary>>,
    pub manual: Mutex<Vec<ManualInstruction>>,
}

impl RecordingSink {
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.summaries.lock().unwrap().clone()
    }

    pub fn summaries_for(&self, session_id: &str) -> Vec<SessionSummary> {
        self.summaries()
            .into_iter()
            .filter(|s| s.session_id == session_id)
            .collect()
    }

    pub fn manual(&self) -> Vec<ManualInstruction> {
        self.manual.lock().unwrap().clone()
    }
}

impl ArtifactSink for RecordingSink {
    fn record_summary<'a>(&'a self, summary: &'a SessionSummary) -> SinkFuture<'a> {
        Box::pin(async move {
            self.summaries.lock().unwrap().push(summary.clone());
            Ok(())
        })
    }

    fn record_manual_instructions<'a>(
        &'a self,
        instruction: &'a ManualInstruction,
    ) -> SinkFuture<'a> {
        Box::pin(async move {
            self.manual.lock().unwrap().push(instruction.clone());
            Ok(())
        })
    }
}

/// What a scripted strategy does when invoked.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Error,
}

/// Strategy that records each payload it receives.
pub struct ScriptedStrategy {
    pub name: String,
    pub kind: StrategyKind,
    pub behavior: Behavior,
    pub payloads: Mutex<Vec<String>>,
}

impl ScriptedStrategy {
    pub fn new(name: &str, kind: StrategyKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            kind,
            behavior,
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

impl DeliveryStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn deliver<'a>(&'a self, payload: &'a str) -> StrategyFuture<'a> {
        Box::pin(async move {
            self.payloads.lock().unwrap().push(payload.to_owned());
            match self.behavior {
                Behavior::Succeed => Ok(true),
                Behavior::Fail => Ok(false),
                Behavior::Error => Err(AppError::Injection(format!("{} exploded", self.name))),
            }
        })
    }
}

/// Linux host without WSL or Wayland.
pub fn linux() -> Platform {
    Platform {
        os: OsFamily::Unix,
        wsl: false,
        wayland: false,
    }
}

/// Automation config with a 30 second inactivity timeout.
pub fn test_automation() -> AutomationConfig {
    AutomationConfig {
        inactivity_timeout_seconds: 30,
        poll_interval_seconds: 1,
        loop_detection_threshold: 3,
        status_log_every: 2,
        ..AutomationConfig::default()
    }
}

/// Everything a monitor scenario needs.
pub struct Harness {
    pub bus: Arc<InMemoryBus>,
    pub sink: Arc<RecordingSink>,
    pub clipboard: Arc<ScriptedStrategy>,
    pub orchestrator: Orchestrator,
}

/// Orchestrator whose only strategy is a clipboard double with `behavior`.
pub fn harness(config: AutomationConfig, behavior: Behavior) -> Harness {
    let bus = Arc::new(InMemoryBus::new());
    let sink = Arc::new(RecordingSink::default());
    let clipboard = ScriptedStrategy::new("clipboard", StrategyKind::ClipboardLinux, behavior);

    let pipeline = InjectionPipeline::new(
        vec![Arc::clone(&clipboard) as Arc<dyn DeliveryStrategy>],
        linux(),
        Arc::clone(&sink) as Arc<dyn ArtifactSink>,
        Duration::from_secs(1),
    );
    let orchestrator = Orchestrator::new(
        Arc::new(config),
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        pipeline,
        Arc::clone(&sink) as Arc<dyn ArtifactSink>,
    );

    Harness {
        bus,
        sink,
        clipboard,
        orchestrator,
    }
}
