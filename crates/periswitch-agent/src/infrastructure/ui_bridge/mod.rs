//! Presentation bridge: exposes application-layer operations to a front end.
//!
//! The status-bar menu and settings window are external collaborators.  They
//! call the async functions in this module, which delegate to the shared
//! [`AppState`], and poll the accessors for fresh data instead of subscribing
//! to change notifications.
//!
//! # Data Transfer Objects (DTOs)
//!
//! Responses carry plain serialisable structs (`PeripheralDto`, `PeerDto`,
//! `StatusDto`) rather than the internal registry types, so the front end
//! sees a stable JSON shape even when the registries change internally.
//!
//! # `CommandResult<T>` wrapper
//!
//! Every operation returns `CommandResult<T>` rather than `Result<T, E>`, so
//! each response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.

use std::sync::Arc;
use std::time::Duration;

use periswitch_core::{ConnectionStatus, PeerHost, Peripheral};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::{
    adapter_queue::{AdapterController, AdapterQueue},
    command_handler::CommandHandler,
    handoff::{HandoffCoordinator, HandoffPhase},
    notify::Notifier,
    peer_registry::{PeerEvent, PeerRegistry},
    peripheral_registry::PeripheralRegistry,
    persistence::{KeyValueStore, Store},
};
use crate::infrastructure::{
    adapter,
    network::{command_channel::TcpCommandChannel, health::TcpHealthChecker},
    notification::LogNotifier,
    storage::{
        config::{data_dir, AppConfig, ConfigError},
        store::{FileKeyValueStore, JsonStore, PEER_HOSTS_KEY, PERIPHERALS_KEY},
    },
};

/// Slack added on top of the peer's convergence budget before a command
/// exchange is abandoned.
const REPLY_SLACK: Duration = Duration::from_secs(2);

/// Error type for assembling the application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start adapter worker: {0}")]
    AdapterWorker(#[source] std::io::Error),
}

// ── Shared application state ──────────────────────────────────────────────────

/// Composition root shared by the front end, the command listener and the
/// discovery pump.
///
/// Both registries sit behind an async `Mutex`: every mutation of peripheral
/// or peer state is serialised through it, whether it comes from the UI, an
/// inbound peer command, or the handoff coordinator.
pub struct AppState {
    pub config: AppConfig,
    pub peripherals: Arc<Mutex<PeripheralRegistry>>,
    pub peers: Arc<Mutex<PeerRegistry>>,
    pub coordinator: HandoffCoordinator,
    pub channel: Arc<TcpCommandChannel>,
    pub handler: Arc<CommandHandler>,
}

impl AppState {
    /// Builds the production state: file-backed registries under the data
    /// directory, the simulated adapter described by `[adapter]`, and the
    /// log notifier.
    ///
    /// # Errors
    ///
    /// [`StateError::Config`] if no data directory can be determined, and
    /// [`StateError::AdapterWorker`] if the adapter thread cannot start.
    pub fn new(config: AppConfig, own_name: &str) -> Result<Arc<Self>, StateError> {
        let dir = data_dir(&config)?;
        info!(data_dir = %dir.display(), "using data directory");
        let adapter = Arc::new(adapter::from_config(&config.adapter));
        Self::assemble(
            config,
            own_name,
            adapter,
            Arc::new(FileKeyValueStore::new(dir)),
            Arc::new(LogNotifier),
        )
    }

    /// Wires the application layer around the given collaborators.
    ///
    /// # Errors
    ///
    /// [`StateError::AdapterWorker`] if the adapter thread cannot start.
    pub fn assemble(
        config: AppConfig,
        own_name: &str,
        adapter: Arc<dyn AdapterController>,
        backend: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Arc<Self>, StateError> {
        let queue = AdapterQueue::spawn(adapter).map_err(StateError::AdapterWorker)?;
        let peripheral_store: Arc<dyn Store<Vec<Peripheral>>> =
            Arc::new(JsonStore::new(Arc::clone(&backend), PERIPHERALS_KEY));
        let peer_store: Arc<dyn Store<Vec<PeerHost>>> =
            Arc::new(JsonStore::new(backend, PEER_HOSTS_KEY));

        let peripherals = Arc::new(Mutex::new(PeripheralRegistry::load(queue, peripheral_store)));
        let peers = Arc::new(Mutex::new(PeerRegistry::load(own_name, peer_store)));

        let policy = config.handoff.policy();
        let reply_timeout = config
            .network
            .command_timeout()
            .max(policy.budget() + REPLY_SLACK);
        let channel = Arc::new(TcpCommandChannel::new(
            config.network.command_timeout(),
            reply_timeout,
        ));
        let probe = Arc::new(TcpHealthChecker::new(config.network.health_check_timeout()));

        let coordinator = HandoffCoordinator::new(
            Arc::clone(&peripherals),
            Arc::clone(&peers),
            probe,
            Arc::clone(&channel) as _,
            Arc::clone(&notifier),
        )
        .with_policy(policy);
        let handler =
            Arc::new(CommandHandler::new(Arc::clone(&peripherals), notifier).with_policy(policy));

        Ok(Arc::new(Self {
            config,
            peripherals,
            peers,
            coordinator,
            channel,
            handler,
        }))
    }
}

/// Folds discovery events into the peer registry until the channel closes.
pub fn spawn_peer_pump(state: Arc<AppState>, mut events: mpsc::Receiver<PeerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            state.peers.lock().await.apply(event);
        }
        debug!("peer event pump stopped");
    })
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One peripheral with its live connection flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralDto {
    pub id: String,
    pub name: String,
    pub connected: bool,
}

/// One peer host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDto {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub active: bool,
}

impl From<&PeerHost> for PeerDto {
    fn from(p: &PeerHost) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            address: p.address.clone(),
            port: p.port,
            active: p.active,
        }
    }
}

/// Snapshot for the status-bar icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDto {
    pub status: ConnectionStatus,
    pub phase: HandoffPhase,
    pub peripheral_count: usize,
    pub registered_peer: Option<PeerDto>,
}

/// The notice a handoff attempt ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeDto {
    pub title: String,
    pub body: String,
}

/// Unified response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Peripheral operations ─────────────────────────────────────────────────────

/// Registered peripherals with live connection flags.
pub async fn get_peripherals(state: Arc<AppState>) -> CommandResult<Vec<PeripheralDto>> {
    let registry = state.peripherals.lock().await;
    let dtos = registry
        .peripherals()
        .iter()
        .map(|p| PeripheralDto {
            id: p.id.clone(),
            name: p.name.clone(),
            connected: registry.is_connected(p),
        })
        .collect();
    CommandResult::ok(dtos)
}

/// Paired devices that could be added, as of the last refresh.
pub async fn get_available_peripherals(state: Arc<AppState>) -> CommandResult<Vec<PeripheralDto>> {
    let registry = state.peripherals.lock().await;
    let dtos = registry
        .available()
        .iter()
        .map(|p| PeripheralDto {
            id: p.id.clone(),
            name: p.name.clone(),
            connected: registry.is_connected(p),
        })
        .collect();
    CommandResult::ok(dtos)
}

/// Re-reads the adapter's paired devices.
pub async fn refresh_available_peripherals(
    state: Arc<AppState>,
) -> CommandResult<Vec<PeripheralDto>> {
    {
        let mut registry = state.peripherals.lock().await;
        if let Err(e) = registry.reconcile_discovered().await {
            return CommandResult::err(e.to_string());
        }
    }
    get_available_peripherals(state).await
}

pub async fn add_peripheral(state: Arc<AppState>, id: String, name: String) -> CommandResult<()> {
    let mut registry = state.peripherals.lock().await;
    match registry.add(Peripheral::new(id, name)) {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

pub async fn remove_peripheral(state: Arc<AppState>, id: String) -> CommandResult<()> {
    let mut registry = state.peripherals.lock().await;
    if registry.remove_from_registry(&id) {
        CommandResult::ok(())
    } else {
        CommandResult::err(format!("peripheral {id} is not registered"))
    }
}

// ── Peer operations ───────────────────────────────────────────────────────────

pub async fn get_registered_peer(state: Arc<AppState>) -> CommandResult<Option<PeerDto>> {
    let peers = state.peers.lock().await;
    CommandResult::ok(peers.registered().map(PeerDto::from))
}

/// Discovered hosts that can be registered.
pub async fn get_available_peers(state: Arc<AppState>) -> CommandResult<Vec<PeerDto>> {
    let peers = state.peers.lock().await;
    CommandResult::ok(peers.available().iter().map(PeerDto::from).collect())
}

/// Registers the discovered host `id` as the handoff peer.
pub async fn register_peer(state: Arc<AppState>, id: String) -> CommandResult<PeerDto> {
    let mut peers = state.peers.lock().await;
    let Some(peer) = peers.find(&id).cloned() else {
        return CommandResult::err(format!("no discovered host with id {id}"));
    };
    let dto = PeerDto::from(&peer);
    peers.register(peer);
    CommandResult::ok(dto)
}

pub async fn unregister_peer(state: Arc<AppState>) -> CommandResult<()> {
    if state.peers.lock().await.unregister() {
        CommandResult::ok(())
    } else {
        CommandResult::err("no peer is registered")
    }
}

async fn registered_peer(state: &AppState) -> Result<PeerHost, String> {
    state
        .peers
        .lock()
        .await
        .registered()
        .cloned()
        .ok_or_else(|| "no peer is registered".to_string())
}

// ── Handoff and peer commands ─────────────────────────────────────────────────

/// Runs one handoff attempt.  The notice has already been shown locally; it
/// is returned as well so the caller can echo it.
pub async fn trigger_handoff(state: Arc<AppState>) -> CommandResult<NoticeDto> {
    let result = state.coordinator.run().await;
    let notice = match &result {
        Ok(outcome) => outcome.notice(),
        Err(e) => e.notice(),
    };
    let dto = NoticeDto {
        title: notice.title,
        body: notice.body,
    };
    match result {
        Ok(_) => CommandResult::ok(dto),
        Err(e) => CommandResult {
            success: false,
            data: Some(dto),
            error: Some(e.to_string()),
        },
    }
}

/// Overwrites the peer's peripheral list with this host's.
pub async fn push_peripherals_to_peer(state: Arc<AppState>) -> CommandResult<usize> {
    let peer = match registered_peer(&state).await {
        Ok(peer) => peer,
        Err(e) => return CommandResult::err(e),
    };
    let list = state.peripherals.lock().await.peripherals().to_vec();
    match state.channel.push_peripherals(&list, &peer).await {
        Ok(()) => {
            info!(count = list.len(), peer = %peer.name, "peripheral list pushed");
            CommandResult::ok(list.len())
        }
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Replaces this host's peripheral list with the peer's.
pub async fn pull_peripherals_from_peer(state: Arc<AppState>) -> CommandResult<usize> {
    let peer = match registered_peer(&state).await {
        Ok(peer) => peer,
        Err(e) => return CommandResult::err(e),
    };
    match state.channel.pull_peripherals(&peer).await {
        Ok(list) => {
            let count = list.len();
            state.peripherals.lock().await.replace_all(list);
            info!(count, peer = %peer.name, "peripheral list pulled");
            CommandResult::ok(count)
        }
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Shows a notification on the peer.
pub async fn notify_peer(state: Arc<AppState>, title: String, body: String) -> CommandResult<()> {
    let peer = match registered_peer(&state).await {
        Ok(peer) => peer,
        Err(e) => return CommandResult::err(e),
    };
    match state.channel.notify(&title, &body, &peer).await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Current aggregate status, coordinator phase and registered peer.
pub async fn get_status(state: Arc<AppState>) -> CommandResult<StatusDto> {
    let (status, peripheral_count) = {
        let registry = state.peripherals.lock().await;
        (registry.compute_status(), registry.peripherals().len())
    };
    let registered_peer = state.peers.lock().await.registered().map(PeerDto::from);
    CommandResult::ok(StatusDto {
        status,
        phase: state.coordinator.phase(),
        peripheral_count,
        registered_peer,
    })
}
