use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use taskweave_adapters::Backends;
use taskweave_engine::{Coordinator, EventChannel, PlannerService};
use taskweave_server::{AppState, ServerConfig};
use taskweave_settings::Settings;
use taskweave_telemetry::{init_telemetry, TelemetryConfig};

/// TaskWeave planning server.
#[derive(Debug, Parser)]
#[command(name = "taskweave", version, about)]
struct Cli {
    /// Settings file (defaults to ~/.taskweave/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

fn load(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match &cli.config {
        Some(path) => taskweave_settings::load_settings_from_path(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => taskweave_settings::load_settings().context("loading settings")?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let _ = init_telemetry(&TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ));
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting TaskWeave server");

    let backends = Backends::from_settings(&settings).context("building backends")?;

    let events = Arc::new(
        EventChannel::new()
            .with_handler_timeout(Duration::from_millis(settings.bus.handler_timeout_ms)),
    );
    let coordinator = Arc::new(
        Coordinator::new(Arc::clone(&backends.prefs), Arc::clone(&backends.proposals), events)
            .with_mode(settings.orchestrator.proposal_mode),
    );
    let planner = Arc::new(PlannerService::new(Arc::clone(&backends.planner)));

    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let state = AppState::new(
        coordinator,
        planner,
        backends.prefs,
        backends.calendar,
        config.max_send_queue,
    );
    let handle = taskweave_server::start(config, state)
        .await
        .context("starting server")?;

    tracing::info!(port = handle.port, "TaskWeave server ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
