mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;

use roost_core::agent::{Agent, TurnCancel};
use roost_core::config::Config;
use roost_core::prompt::Mode;
use roost_llm::ollama::OllamaProvider;
use roost_tools::{AuditLogger, CommandPolicy, ShellExecutor};

use crate::cli::CliChannel;

/// A second Ctrl-C within this window exits instead of cancelling.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "roost", version, about)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting mode: planning or fast.
    #[arg(long)]
    mode: Option<String>,

    /// Model name, overrides the config file.
    #[arg(long)]
    model: Option<String>,

    /// Identity recorded in the audit log for this terminal session.
    #[arg(long, default_value = "local")]
    user: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_subscriber();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if let Some(mode) = &args.mode {
        config.agent.mode =
            Mode::try_parse(mode).with_context(|| format!("unknown mode '{mode}'"))?;
    }
    if let Some(model) = args.model {
        config.llm.model = model;
    }

    let provider = OllamaProvider::new(&config.llm.base_url, config.llm.timeout())?;
    if let Err(e) = provider.health_check().await {
        tracing::warn!("LLM backend not reachable at {}: {e}", config.llm.base_url);
    }

    let policy = CommandPolicy::from_config(&config.tools.shell)
        .context("invalid tools.shell.extra_patterns")?;
    let executor = ShellExecutor::new(&config.tools.shell, policy.clone());
    let audit = AuditLogger::from_config(&config.tools.audit)
        .await
        .context("failed to open audit log")?;

    println!("roost v{}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut agent = Agent::new(provider, CliChannel::stdio(args.user), executor)
        .with_config(&config)
        .with_policy(Arc::new(policy))
        .with_audit(Arc::new(audit))
        .with_shutdown(shutdown_rx);

    tokio::spawn(handle_interrupts(agent.cancel_handle(), shutdown_tx));

    agent.run().await
}

/// Ctrl-C cancels the running turn; a quick second press shuts down.
async fn handle_interrupts(cancel: TurnCancel, shutdown: watch::Sender<bool>) {
    let mut last: Option<tokio::time::Instant> = None;
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        let now = tokio::time::Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < DOUBLE_INTERRUPT_WINDOW) {
            tracing::info!("received shutdown signal");
            let _ = shutdown.send(true);
            return;
        }
        tracing::info!("cancelling current turn");
        cancel.cancel();
        last = Some(now);
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(cli: Option<&std::path::Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("ROOST_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
