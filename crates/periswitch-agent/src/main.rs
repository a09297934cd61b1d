//! PeriSwitch agent entry point.
//!
//! Wires together all infrastructure services and starts the Tokio async
//! runtime.  The status-bar gesture is stood in for by trigger lines on stdin.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, init tracing, write default config on first run
//!  └─ AppState::new()          -- registries, coordinator, command handler
//!  └─ start services
//!       ├─ CommandListener     (accept loop task)
//!       ├─ MdnsDiscovery       (advertise + browse)
//!       └─ peer event pump     (PeerEvent → PeerRegistry)
//!  └─ stdin loop until `quit` or Ctrl-C
//! ```
//!
//! # Usage
//!
//! ```text
//! periswitch-agent [--config <PATH>]
//!
//! stdin commands:
//!   switch            run one handoff
//!   status            print status snapshot
//!   refresh           re-read paired devices
//!   peers             list discovered hosts
//!   register <id>     make a discovered host the handoff peer
//!   push | pull       sync the peripheral list with the peer
//!   quit
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use periswitch_agent::infrastructure::network::discovery::{
    resolve_instance_name, MdnsDiscovery, ServiceDiscovery,
};
use periswitch_agent::infrastructure::network::listener::CommandListener;
use periswitch_agent::infrastructure::storage::config::{
    config_file_path, load_config_from, save_config_to, AppConfig,
};
use periswitch_agent::infrastructure::ui_bridge::{self, AppState, CommandResult};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// PeriSwitch host agent.
///
/// Moves a fixed set of Bluetooth peripherals between this host and one
/// registered peer on the LAN.
#[derive(Debug, Parser)]
#[command(
    name = "periswitch-agent",
    about = "Hands Bluetooth peripherals over between two hosts",
    version
)]
struct Cli {
    /// Path to the TOML config file.  Defaults to the platform config dir.
    #[arg(long, env = "PERISWITCH_CONFIG")]
    config: Option<PathBuf>,
}

fn config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => config_file_path().context("no platform config directory"),
    }
}

/// Writes the defaults out so the user has a file to edit.
fn write_default_config(config: &AppConfig, path: &Path) {
    match save_config_to(config, path) {
        Ok(()) => info!(path = %path.display(), "wrote default config"),
        Err(e) => warn!(error = %e, "could not write default config"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = config_path(&cli)?;
    let first_run = !config_path.exists();
    let config = load_config_from(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level)),
        )
        .init();

    info!(version = %config.agent.version, "PeriSwitch agent starting");
    if first_run {
        write_default_config(&config, &config_path);
    }

    let own_name = resolve_instance_name(&config.agent.host_name);
    let state = AppState::new(config, &own_name).context("failed to build application state")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Command listener ──────────────────────────────────────────────────────
    let listener = CommandListener::bind(
        &state.config.network.bind_address,
        state.config.network.listen_port,
        Arc::clone(&state.handler),
    )
    .await
    .context("failed to start command listener")?;
    let port = listener.local_port();
    let listener_task = listener.spawn(shutdown_rx);

    // ── Discovery ─────────────────────────────────────────────────────────────
    let discovery = match start_discovery(&state, &own_name, port) {
        Ok(discovery) => Some(discovery),
        Err(e) => {
            error!(error = %e, "peer discovery unavailable; using the persisted peer only");
            None
        }
    };

    info!(instance = %own_name, port, "PeriSwitch agent ready.  Type `switch` or press Ctrl-C to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !dispatch(&state, line.trim()).await {
                        break;
                    }
                }
                Ok(None) => {
                    // stdin closed; keep serving the peer until Ctrl-C.
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("shutdown signal received");
                    }
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            },
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────
    drop(discovery);
    let _ = shutdown_tx.send(true);
    if let Err(e) = listener_task.await {
        error!(error = %e, "listener task failed");
    }
    info!("PeriSwitch agent stopped");
    Ok(())
}

fn start_discovery(
    state: &Arc<AppState>,
    own_name: &str,
    port: u16,
) -> anyhow::Result<MdnsDiscovery> {
    let mut discovery = MdnsDiscovery::new(&state.config.network.service_type, own_name)?;
    discovery.advertise(port)?;
    let events = discovery.browse()?;
    ui_bridge::spawn_peer_pump(Arc::clone(state), events);
    Ok(discovery)
}

/// Runs one stdin command.  Returns `false` on `quit`.
async fn dispatch(state: &Arc<AppState>, line: &str) -> bool {
    let mut words = line.split_whitespace();
    let state = Arc::clone(state);
    match (words.next(), words.next()) {
        (None, _) => {}
        (Some("switch"), _) => print(ui_bridge::trigger_handoff(state).await),
        (Some("status"), _) => print(ui_bridge::get_status(state).await),
        (Some("refresh"), _) => print(ui_bridge::refresh_available_peripherals(state).await),
        (Some("peers"), _) => print(ui_bridge::get_available_peers(state).await),
        (Some("register"), Some(id)) => print(ui_bridge::register_peer(state, id.to_string()).await),
        (Some("push"), _) => print(ui_bridge::push_peripherals_to_peer(state).await),
        (Some("pull"), _) => print(ui_bridge::pull_peripherals_from_peer(state).await),
        (Some("quit"), _) => return false,
        (Some(other), _) => warn!(command = other, "unknown command"),
    }
    true
}

fn print<T: Serialize>(result: CommandResult<T>) {
    match serde_json::to_string(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "could not render result"),
    }
}
