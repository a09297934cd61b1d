//! HandoffCoordinator: the single-gesture peripheral handoff state machine.
//!
//! # State machine
//!
//! ```text
//!           trigger
//! Idle ───────────────► HealthChecking ──fail──► Idle (HealthCheckFailed/Timeout)
//!                             │ ok
//!                             ▼
//!                          Deciding ─── Partial ───► Blocked ──► Idle (InconsistentState)
//!                       │            │
//!           AllConnected│            │AllDisconnected
//!                       ▼            ▼
//!                  Releasing      Acquiring
//!          release all locally    UNREGISTER_ALL to peer (peer confirms release)
//!          poll until released    connect all locally
//!          CONNECT_ALL to peer
//!                       │            │
//!                       └────► Idle ◄┘
//! ```
//!
//! Whichever host currently holds the peripherals is the *source*; the other is
//! the *destination*.  Both hosts run the same code; the branch is chosen from
//! the local [`ConnectionStatus`].
//!
//! Every call to [`HandoffCoordinator::run`] ends in exactly one user notice.

use std::sync::Arc;

use async_trait::async_trait;
use periswitch_core::{Command, ConnectionStatus, HealthCheckResult, PeerHost, ProtocolError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::notify::{
    Notice, Notifier, MSG_DISCONNECT_FAILED, MSG_NO_PEER, MSG_NO_RESPONSE, MSG_PARTIAL_STATE,
    MSG_PEER_CONNECT_FAILED, MSG_PEER_RELEASE_FAILED, MSG_POWERED_OFF, TITLE_DONE, TITLE_ERROR,
    TITLE_WARNING,
};
use super::ownership::{acquire_all, release_all_and_confirm, BatchReport, ConvergencePolicy};
use super::peer_registry::PeerRegistry;
use super::peripheral_registry::{PeripheralRegistry, RegistryError};

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Liveness probe against the peer's command listener.
#[async_trait]
pub trait PeerProbe: Send + Sync {
    async fn probe(&self, peer: &PeerHost) -> HealthCheckResult;
}

/// Error type for one request/reply exchange with the peer.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("could not reach {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("timed out waiting for {endpoint}")]
    Timeout { endpoint: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("peer answered {0}")]
    Rejected(Command),
}

/// One-shot command exchanges with the peer.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Sends a bare command.  `true` iff the peer replied `OP_SUCCESS`.
    async fn send(&self, command: Command, peer: &PeerHost) -> bool;
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Where the coordinator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandoffPhase {
    Idle,
    HealthChecking,
    Deciding,
    Releasing,
    Acquiring,
    Blocked,
}

/// Terminal failure of a handoff attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandoffError {
    #[error("no peer host is registered")]
    NoPeerRegistered,

    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("device {0} is out of range")]
    OutOfRange(String),

    #[error("pairing failed (code {0})")]
    PairingFailed(i32),

    #[error("connection failed (code {0})")]
    ConnectFailed(i32),

    #[error("disconnect failed (code {0})")]
    DisconnectFailed(i32),

    #[error("peer did not answer the health check in time")]
    HealthCheckTimeout,

    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("peer failed {0}")]
    CommandFailed(Command),

    #[error("peripherals still connected after release")]
    DisconnectTimeout,

    #[error("peripherals are partially connected")]
    InconsistentState,

    #[error("adapter queue is not running")]
    AdapterUnavailable,
}

impl From<RegistryError> for HandoffError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AdapterPoweredOff => HandoffError::AdapterPoweredOff,
            RegistryError::DeviceNotFound(id) => HandoffError::DeviceNotFound(id),
            RegistryError::OutOfRange(id) => HandoffError::OutOfRange(id),
            RegistryError::PairingFailed(code) => HandoffError::PairingFailed(code),
            RegistryError::ConnectFailed(code) => HandoffError::ConnectFailed(code),
            RegistryError::DisconnectFailed(code) => HandoffError::DisconnectFailed(code),
            RegistryError::AdapterUnavailable => HandoffError::AdapterUnavailable,
        }
    }
}

impl HandoffError {
    /// The user-facing notice for this failure.
    pub fn notice(&self) -> Notice {
        match self {
            HandoffError::NoPeerRegistered => Notice::new(TITLE_ERROR, MSG_NO_PEER),
            HandoffError::HealthCheckTimeout => Notice::new(TITLE_ERROR, MSG_NO_RESPONSE),
            HandoffError::HealthCheckFailed(reason) => Notice::new(
                TITLE_ERROR,
                format!("Failed to communicate with device: {reason}"),
            ),
            HandoffError::DisconnectTimeout => Notice::new(TITLE_ERROR, MSG_DISCONNECT_FAILED),
            HandoffError::CommandFailed(Command::UnregisterAll) => {
                Notice::new(TITLE_ERROR, MSG_PEER_RELEASE_FAILED)
            }
            HandoffError::CommandFailed(_) => Notice::new(TITLE_ERROR, MSG_PEER_CONNECT_FAILED),
            HandoffError::InconsistentState => Notice::new(TITLE_WARNING, MSG_PARTIAL_STATE),
            HandoffError::AdapterPoweredOff => Notice::new(TITLE_ERROR, MSG_POWERED_OFF),
            other => Notice::new(TITLE_ERROR, other.to_string()),
        }
    }
}

/// Successful end of a handoff attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// This host was the source; the peer now holds the peripherals.
    HandedOver { peer: String, released: BatchReport },
    /// This host was the destination; `acquired` lists what connected.
    TookOver { peer: String, acquired: BatchReport },
}

impl HandoffOutcome {
    pub fn notice(&self) -> Notice {
        match self {
            HandoffOutcome::HandedOver { peer, .. } => {
                Notice::new(TITLE_DONE, format!("Peripherals handed over to {peer}"))
            }
            HandoffOutcome::TookOver { peer, acquired } if acquired.all_succeeded() => Notice::new(
                TITLE_DONE,
                format!("Connected {} peripherals from {peer}", acquired.succeeded.len()),
            ),
            HandoffOutcome::TookOver { peer, acquired } => Notice::new(
                TITLE_WARNING,
                format!(
                    "Connected {} of {} peripherals from {peer}. Failed: {}",
                    acquired.succeeded.len(),
                    acquired.total(),
                    acquired.failed_names()
                ),
            ),
        }
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Runs handoff attempts.  Concurrent triggers are serialised.
pub struct HandoffCoordinator {
    peripherals: Arc<Mutex<PeripheralRegistry>>,
    peers: Arc<Mutex<PeerRegistry>>,
    probe: Arc<dyn PeerProbe>,
    transport: Arc<dyn CommandTransport>,
    notifier: Arc<dyn Notifier>,
    policy: ConvergencePolicy,
    phase: watch::Sender<HandoffPhase>,
    running: Mutex<()>,
}

impl HandoffCoordinator {
    pub fn new(
        peripherals: Arc<Mutex<PeripheralRegistry>>,
        peers: Arc<Mutex<PeerRegistry>>,
        probe: Arc<dyn PeerProbe>,
        transport: Arc<dyn CommandTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (phase, _) = watch::channel(HandoffPhase::Idle);
        Self {
            peripherals,
            peers,
            probe,
            transport,
            notifier,
            policy: ConvergencePolicy::default(),
            phase,
            running: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn phase(&self) -> HandoffPhase {
        *self.phase.borrow()
    }

    /// Receives every phase transition.
    pub fn subscribe(&self) -> watch::Receiver<HandoffPhase> {
        self.phase.subscribe()
    }

    /// Performs one handoff attempt and delivers its notice.
    pub async fn run(&self) -> Result<HandoffOutcome, HandoffError> {
        let _serial = self.running.lock().await;
        let attempt = Uuid::new_v4();

        let result = self
            .execute()
            .instrument(info_span!("handoff", %attempt))
            .await;
        self.set_phase(HandoffPhase::Idle);

        let notice = match &result {
            Ok(outcome) => {
                info!(%attempt, ?outcome, "handoff finished");
                outcome.notice()
            }
            Err(e) => {
                warn!(%attempt, error = %e, "handoff failed");
                e.notice()
            }
        };
        notice.deliver(self.notifier.as_ref());
        result
    }

    async fn execute(&self) -> Result<HandoffOutcome, HandoffError> {
        let peer = self
            .peers
            .lock()
            .await
            .registered()
            .cloned()
            .ok_or(HandoffError::NoPeerRegistered)?;

        self.set_phase(HandoffPhase::HealthChecking);
        match self.probe.probe(&peer).await {
            HealthCheckResult::Success => {}
            HealthCheckResult::Timeout => return Err(HandoffError::HealthCheckTimeout),
            HealthCheckResult::Failure(reason) => {
                return Err(HandoffError::HealthCheckFailed(reason))
            }
        }

        self.set_phase(HandoffPhase::Deciding);
        let status = {
            let registry = self.peripherals.lock().await;
            registry.ensure_powered()?;
            registry.compute_status()
        };
        info!(?status, peer = %peer.name, "handoff direction decided");

        match status {
            ConnectionStatus::AllConnected => self.hand_over(peer).await,
            ConnectionStatus::AllDisconnected => self.take_over(peer).await,
            ConnectionStatus::Partial => {
                self.set_phase(HandoffPhase::Blocked);
                Err(HandoffError::InconsistentState)
            }
        }
    }

    /// Source branch.  The peer is contacted only after a confirmed release.
    async fn hand_over(&self, peer: PeerHost) -> Result<HandoffOutcome, HandoffError> {
        self.set_phase(HandoffPhase::Releasing);
        let (released, converged) = release_all_and_confirm(&self.peripherals, self.policy).await;
        if !converged {
            return Err(HandoffError::DisconnectTimeout);
        }

        if !self.transport.send(Command::ConnectAll, &peer).await {
            return Err(HandoffError::CommandFailed(Command::ConnectAll));
        }
        Ok(HandoffOutcome::HandedOver {
            peer: peer.name,
            released,
        })
    }

    /// Destination branch.  The peer only answers `OP_SUCCESS` once its own
    /// release has converged, so local connects never overlap its ownership.
    async fn take_over(&self, peer: PeerHost) -> Result<HandoffOutcome, HandoffError> {
        self.set_phase(HandoffPhase::Acquiring);
        if !self.transport.send(Command::UnregisterAll, &peer).await {
            return Err(HandoffError::CommandFailed(Command::UnregisterAll));
        }

        let acquired = acquire_all(&self.peripherals).await;
        Ok(HandoffOutcome::TookOver {
            peer: peer.name,
            acquired,
        })
    }

    fn set_phase(&self, phase: HandoffPhase) {
        self.phase.send_replace(phase);
    }
}
