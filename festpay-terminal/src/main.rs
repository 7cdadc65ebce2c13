//! Festpay Terminal
//!
//! Headless companion of a festival top-up terminal: keeps replaying the
//! durable booking queue against the backend and lets operators inspect it.

use clap::{Parser, Subcommand};
use festpay_terminal::commands;
use festpay_terminal::config::ConfigLoader;
use festpay_terminal::state::TerminalState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Festpay Terminal - durable booking queue for cashless festival payments
#[derive(Parser, Debug)]
#[command(name = "festpay-terminal")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./festpay-terminal.toml")]
    config: PathBuf,

    /// Terminal signing secret, overrides `backend.terminal_secret`
    #[arg(long, env = "FESTPAY_TERMINAL_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay queued bookings until stopped (default)
    Run,
    /// List queued and parked requests
    Pending,
    /// Drop a queued request without booking it
    Discard { id: Uuid },
    /// Move a parked request back into the replay set
    Requeue { id: Uuid },
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting festpay-terminal v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.secret));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", config_loader.path());

    let state = TerminalState::open(&loaded_config).await.map_err(|e| {
        tracing::error!("Failed to open terminal state: {}", e);
        e
    })?;

    let result = match args.command.unwrap_or(Command::Run) {
        Command::Run => return commands::run(state, config_loader).await,
        Command::Pending => commands::pending(&state).await,
        Command::Discard { id } => commands::discard(&state, id).await,
        Command::Requeue { id } => commands::requeue(&state, id).await,
        Command::CheckConfig => commands::check_config(&state, &loaded_config).await,
    };

    state.close().await;
    result
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
