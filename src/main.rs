#![forbid(unsafe_code)]

//! `chat-orchestrator`: agent chat session orchestrator binary.
//!
//! Loads configuration, creates one session per configured agent, delivers
//! each prompt and monitors the sessions until they finish or the process
//! is asked to stop.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chat_orchestrator::artifacts::{ArtifactSink, FanoutSink, FileArtifactWriter};
use chat_orchestrator::bus::http::HttpBus;
use chat_orchestrator::bus::memory::InMemoryBus;
use chat_orchestrator::bus::{messages_channel, status_channel, MessageBus};
use chat_orchestrator::config::GlobalConfig;
use chat_orchestrator::injection::strategies::{default_strategies, StrategyEnv};
use chat_orchestrator::injection::{InjectionPipeline, Platform};
use chat_orchestrator::orchestrator::Orchestrator;
use chat_orchestrator::persistence::db;
use chat_orchestrator::persistence::summary_repo::SqliteSummaryStore;
use chat_orchestrator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "chat-orchestrator", about = "Agent chat session orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Validate and print the configuration, then exit.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("chat-orchestrator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    let prompts = config
        .agents
        .iter()
        .map(|agent| agent.load_prompt().map(|prompt| (agent.role.clone(), prompt)))
        .collect::<Result<Vec<_>>>()?;
    info!(
        agents = prompts.len(),
        max_iterations = config.automation.max_iterations,
        "configuration loaded"
    );

    if args.dry_run {
        println!("{config:#?}");
        return Ok(());
    }

    // ── Collaborators ───────────────────────────────────
    let bus = build_bus(&config)?;
    let sink = build_sink(&config).await?;
    let platform = Platform::detect();
    let env = Arc::new(StrategyEnv::from_config(&config, platform));
    let pipeline = InjectionPipeline::new(
        default_strategies(&env),
        platform,
        Arc::clone(&sink),
        config.injection.strategy_timeout(),
    );
    info!(strategies = ?pipeline.strategy_names(), "injection pipeline ready");

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(config.automation.clone()),
        Arc::clone(&bus),
        pipeline,
        sink,
    ));

    // ── Register on the bus ─────────────────────────────
    let mut channels: Vec<String> = Vec::new();
    for agent in &config.agents {
        channels.push(messages_channel(&agent.role));
        channels.push(status_channel(&agent.role));
        channels.extend(agent.channels.iter().cloned());
    }
    channels.sort();
    channels.dedup();
    match bus.register(&config.bus.agent_name, &channels).await {
        Ok(agent_id) => info!(%agent_id, channels = channels.len(), "registered on message bus"),
        Err(err) => warn!(%err, "bus registration failed; continuing"),
    }

    // ── Create and inject sessions ──────────────────────
    for (role, prompt) in &prompts {
        let id = orchestrator.create(role, prompt);
        match orchestrator.inject(&id).await {
            Ok(outcome) => info!(session_id = %id, ?outcome, "initial injection finished"),
            Err(err) => error!(session_id = %id, %err, "initial injection failed"),
        }
    }

    // ── Monitor ─────────────────────────────────────────
    let monitor = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.monitor().await })
    };

    let poll_interval = config.automation.poll_interval();
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = wait_until_idle(&orchestrator, poll_interval) => info!("no sessions running"),
    }

    orchestrator.stop().await;
    if let Err(err) = monitor.await {
        error!(%err, "monitor task failed");
    }

    // ── Final status ────────────────────────────────────
    for view in orchestrator.status_snapshot() {
        println!(
            "{}  {:<11} runtime={:.1}s messages={} errors={} loop={}",
            view.id,
            view.status,
            view.runtime_seconds,
            view.message_count,
            view.error_count,
            view.loop_detected
        );
    }
    info!("chat-orchestrator shut down");

    Ok(())
}

fn build_bus(config: &GlobalConfig) -> Result<Arc<dyn MessageBus>> {
    if config.bus.url.is_some() {
        let bus = HttpBus::from_config(&config.bus)?;
        info!(url = ?config.bus.url, "using http message bus");
        Ok(Arc::new(bus))
    } else {
        info!("no bus url configured; using in-process message bus");
        Ok(Arc::new(InMemoryBus::new()))
    }
}

async fn build_sink(config: &GlobalConfig) -> Result<Arc<dyn ArtifactSink>> {
    let mut sinks: Vec<Arc<dyn ArtifactSink>> = vec![Arc::new(FileArtifactWriter::new(
        config.artifacts.directory.clone(),
    )?)];

    if let Some(path) = &config.artifacts.database_path {
        let pool = db::connect(path).await?;
        info!(path = %path.display(), "summary database connected");
        sinks.push(Arc::new(SqliteSummaryStore::new(Arc::new(pool))));
    }

    Ok(Arc::new(FanoutSink::new(sinks)))
}

async fn wait_until_idle(orchestrator: &Orchestrator, poll_interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if orchestrator.running_count() == 0 {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
