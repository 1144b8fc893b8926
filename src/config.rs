//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Monitoring thresholds shared by the registry, detectors and monitor loop.
///
/// Immutable once loaded; components receive it behind an `Arc`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AutomationConfig {
    /// Upper bound on iterations an agent is expected to run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Minimum number of newly read messages before a loop can be declared.
    #[serde(default = "default_loop_detection_threshold")]
    pub loop_detection_threshold: usize,
    /// Seconds without bus activity before a session times out.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,
    /// Seconds between monitor cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Whether strategies may drive keystrokes into the target application.
    #[serde(default = "default_true")]
    pub enable_gui_automation: bool,
    /// Emit an aggregate status log every N monitor cycles.
    #[serde(default = "default_status_log_every")]
    pub status_log_every: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            loop_detection_threshold: default_loop_detection_threshold(),
            inactivity_timeout_seconds: default_inactivity_timeout(),
            poll_interval_seconds: default_poll_interval(),
            enable_gui_automation: true,
            status_log_every: default_status_log_every(),
        }
    }
}

impl AutomationConfig {
    /// Inactivity timeout as a [`Duration`].
    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.loop_detection_threshold == 0 {
            return Err(AppError::Config(
                "loop_detection_threshold must be greater than zero".into(),
            ));
        }
        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.inactivity_timeout_seconds == 0 {
            return Err(AppError::Config(
                "inactivity_timeout_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Message bus connectivity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BusConfig {
    /// Base URL of the HTTP bus. When absent an in-process bus is used.
    #[serde(default)]
    pub url: Option<String>,
    /// Agent name the orchestrator registers under.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// Per-request timeout for bus calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: None,
            agent_name: default_agent_name(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Injection strategy tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct InjectionConfig {
    /// Hard ceiling on a single strategy invocation.
    #[serde(default = "default_strategy_timeout")]
    pub strategy_timeout_seconds: u64,
    /// Key chords sent before pasting to focus the chat input.
    #[serde(default = "default_chat_hotkeys")]
    pub chat_hotkeys: Vec<String>,
    /// Window title used to focus the target application.
    #[serde(default = "default_window_title")]
    pub window_title: String,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_seconds: default_strategy_timeout(),
            chat_hotkeys: default_chat_hotkeys(),
            window_title: default_window_title(),
        }
    }
}

impl InjectionConfig {
    /// Strategy timeout as a [`Duration`].
    #[must_use]
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_seconds)
    }
}

/// Where session summaries and manual-instruction files go.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactConfig {
    /// Directory receiving summary JSON and manual-setup text files.
    #[serde(default = "default_artifact_dir")]
    pub directory: PathBuf,
    /// Optional `SQLite` file that also receives session summaries.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            directory: default_artifact_dir(),
            database_path: None,
        }
    }
}

/// One agent session to create at startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Logical role (architect, executor, reviewer, ...).
    pub role: String,
    /// Inline prompt payload.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Path to a file holding the prompt payload.
    #[serde(default)]
    pub prompt_file: Option<PathBuf>,
    /// Extra bus channels the agent participates in.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl AgentConfig {
    /// Resolve the prompt payload, reading `prompt_file` when set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the prompt file cannot be read.
    pub fn load_prompt(&self) -> Result<String> {
        match (&self.prompt, &self.prompt_file) {
            (Some(prompt), None) => Ok(prompt.clone()),
            (None, Some(path)) => fs::read_to_string(path).map_err(|err| {
                AppError::Config(format!(
                    "failed to read prompt file {}: {err}",
                    path.display()
                ))
            }),
            _ => Err(AppError::Config(format!(
                "agent {} must set exactly one of prompt or prompt_file",
                self.role
            ))),
        }
    }
}

fn default_max_iterations() -> u32 {
    30
}

fn default_loop_detection_threshold() -> usize {
    3
}

fn default_inactivity_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_status_log_every() -> u64 {
    30
}

fn default_agent_name() -> String {
    "orchestrator".into()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_strategy_timeout() -> u64 {
    20
}

fn default_chat_hotkeys() -> Vec<String> {
    vec!["ctrl+l".into(), "ctrl+k".into()]
}

fn default_window_title() -> String {
    "Cursor".into()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Monitoring thresholds.
    #[serde(default)]
    pub automation: AutomationConfig,
    /// Message bus connectivity.
    #[serde(default)]
    pub bus: BusConfig,
    /// Injection strategy tuning.
    #[serde(default)]
    pub injection: InjectionConfig,
    /// Artifact destinations.
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    /// Sessions created at startup.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.automation.validate()?;

        if self.injection.strategy_timeout_seconds == 0 {
            return Err(AppError::Config(
                "strategy_timeout_seconds must be greater than zero".into(),
            ));
        }

        for agent in &self.agents {
            if agent.role.trim().is_empty() {
                return Err(AppError::Config("agent role must not be empty".into()));
            }
            if agent.prompt.is_some() == agent.prompt_file.is_some() {
                return Err(AppError::Config(format!(
                    "agent {} must set exactly one of prompt or prompt_file",
                    agent.role
                )));
            }
        }

        Ok(())
    }
}
