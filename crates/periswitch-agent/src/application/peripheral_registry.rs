//! PeripheralRegistry: the persistent list of peripherals this host hands over.
//!
//! The registry owns two lists:
//!
//! - **registered**: the peripherals the user chose to move between hosts.
//!   Persisted under the `"peripherals"` key so it survives restarts.
//! - **available**: peripherals paired with this host but not yet registered.
//!   Rebuilt wholesale by [`PeripheralRegistry::reconcile_discovered`].
//!
//! Connection state is never stored.  It is asked of the adapter every time it
//! is needed, so the registry can never disagree with the radio.
//!
//! # Connect pipeline
//!
//! ```text
//! power on? ─► resolve ─► rssi != 127 ─► pair ─► open ─► confirmed connected
//!     │           │            │           │        │            │
//!  PoweredOff  NotFound    OutOfRange   Pairing  Connect     Connect
//!                                       Failed   Failed      Failed(0)
//! ```
//!
//! The registry lives behind a `tokio::sync::Mutex` in `AppState`; the
//! blocking adapter calls go through the shared [`AdapterQueue`].

use std::sync::Arc;

use periswitch_core::{ConnectionStatus, Peripheral};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::adapter_queue::{
    AdapterCode, AdapterController, AdapterQueue, DeviceHandle, PowerState, QueueClosed,
    RSSI_UNAVAILABLE,
};
use super::persistence::Store;

/// Code carried by [`RegistryError::ConnectFailed`] when the adapter accepted
/// the open request but never reported the device as connected.
pub const UNCONFIRMED_CONNECTION: AdapterCode = 0;

/// Code carried by [`RegistryError::DisconnectFailed`] when the adapter
/// refused to forget a device.
pub const FORGET_REJECTED: AdapterCode = -1;

/// Display name given to paired devices that do not report one.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Error type for peripheral operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("device {0} is out of range")]
    OutOfRange(String),

    #[error("pairing failed (code {0})")]
    PairingFailed(AdapterCode),

    #[error("connection failed (code {0})")]
    ConnectFailed(AdapterCode),

    #[error("disconnect failed (code {0})")]
    DisconnectFailed(AdapterCode),

    #[error("adapter queue is not running")]
    AdapterUnavailable,
}

impl From<QueueClosed> for RegistryError {
    fn from(_: QueueClosed) -> Self {
        RegistryError::AdapterUnavailable
    }
}

/// Registered and available peripherals plus the adapter they live on.
pub struct PeripheralRegistry {
    queue: AdapterQueue,
    store: Arc<dyn Store<Vec<Peripheral>>>,
    peripherals: Vec<Peripheral>,
    available: Vec<Peripheral>,
}

impl PeripheralRegistry {
    /// Builds the registry, restoring the last persisted list.
    ///
    /// A missing or unreadable list starts the registry empty.
    pub fn load(queue: AdapterQueue, store: Arc<dyn Store<Vec<Peripheral>>>) -> Self {
        let peripherals = match store.load() {
            Ok(Some(list)) => dedupe(list),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "could not restore peripheral list; starting empty");
                Vec::new()
            }
        };
        debug!(count = peripherals.len(), "peripheral registry loaded");

        Self {
            queue,
            store,
            peripherals,
            available: Vec::new(),
        }
    }

    /// Registered peripherals in registration order.
    pub fn peripherals(&self) -> &[Peripheral] {
        &self.peripherals
    }

    /// Paired peripherals that are not registered.
    pub fn available(&self) -> &[Peripheral] {
        &self.available
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peripherals.iter().any(|p| p.id == id)
    }

    /// Fails fast with [`RegistryError::AdapterPoweredOff`] when the radio is off.
    pub fn ensure_powered(&self) -> Result<(), RegistryError> {
        match self.queue.adapter().power_state() {
            PowerState::On => Ok(()),
            PowerState::Off => Err(RegistryError::AdapterPoweredOff),
        }
    }

    /// Live connection state of one peripheral.  Unresolvable devices read as
    /// disconnected.
    pub fn is_connected(&self, peripheral: &Peripheral) -> bool {
        let adapter = self.queue.adapter();
        adapter
            .resolve(&peripheral.id)
            .map(|device| adapter.is_connected(&device))
            .unwrap_or(false)
    }

    /// Aggregate state over the registered peripherals.
    ///
    /// Peripherals the adapter cannot resolve do not count either way.
    pub fn compute_status(&self) -> ConnectionStatus {
        let adapter = self.queue.adapter();
        ConnectionStatus::from_readings(
            self.peripherals
                .iter()
                .filter_map(|p| adapter.resolve(&p.id))
                .map(|device| adapter.is_connected(&device)),
        )
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Registers a peripheral the adapter can resolve.
    ///
    /// Re-adding a registered id refreshes its name in place.
    pub fn add(&mut self, peripheral: Peripheral) -> Result<(), RegistryError> {
        self.ensure_powered()?;
        if self.queue.adapter().resolve(&peripheral.id).is_none() {
            return Err(RegistryError::DeviceNotFound(peripheral.id));
        }

        self.available.retain(|p| p.id != peripheral.id);
        match self.peripherals.iter_mut().find(|p| p.id == peripheral.id) {
            Some(existing) => existing.name = peripheral.name,
            None => {
                info!(id = %peripheral.id, name = %peripheral.name, "peripheral registered");
                self.peripherals.push(peripheral);
            }
        }
        self.persist();
        Ok(())
    }

    /// Drops a peripheral from the registry regardless of its connection state.
    /// If the adapter still has it paired it goes back on the available list.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove_from_registry(&mut self, id: &str) -> bool {
        let Some(index) = self.peripherals.iter().position(|p| p.id == id) else {
            return false;
        };
        let removed = self.peripherals.remove(index);
        info!(%id, "peripheral removed from registry");
        self.persist();

        let still_paired = self
            .queue
            .adapter()
            .paired_devices()
            .iter()
            .any(|device| device.address == removed.id);
        if still_paired && !self.available.iter().any(|p| p.id == removed.id) {
            self.available.push(removed);
        }
        true
    }

    /// Replaces the registered list with one received from the peer.
    pub fn replace_all(&mut self, peripherals: Vec<Peripheral>) {
        self.peripherals = dedupe(peripherals);
        let registered = &self.peripherals;
        self.available
            .retain(|a| !registered.iter().any(|p| p.id == a.id));
        info!(count = self.peripherals.len(), "peripheral list replaced");
        self.persist();
    }

    /// Rebuilds the available list from the adapter's paired devices,
    /// excluding anything already registered.
    pub async fn reconcile_discovered(&mut self) -> Result<&[Peripheral], RegistryError> {
        self.ensure_powered()?;
        let paired = self.queue.run(|adapter| adapter.paired_devices()).await?;

        self.available = paired
            .into_iter()
            .filter(|device| !self.contains(&device.address))
            .map(|device| {
                let name = device
                    .name
                    .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
                Peripheral::new(device.address, name)
            })
            .collect();
        debug!(count = self.available.len(), "available peripherals refreshed");
        Ok(&self.available)
    }

    // ── Adapter operations ───────────────────────────────────────────────────

    /// Pairs with and opens a connection to `peripheral`.
    ///
    /// Succeeds only once the adapter confirms the device is connected.  On
    /// success the registered entry (if any) picks up the adapter's name for it.
    pub async fn connect(&mut self, peripheral: &Peripheral) -> Result<(), RegistryError> {
        self.ensure_powered()?;
        let id = peripheral.id.clone();
        let reported = self.queue.run(move |adapter| connect_device(adapter, &id)).await??;

        info!(id = %peripheral.id, "peripheral connected");
        if let Some(name) = reported {
            if let Some(entry) = self.peripherals.iter_mut().find(|p| p.id == peripheral.id) {
                if entry.name != name {
                    entry.name = name;
                    self.persist();
                }
            }
        }
        Ok(())
    }

    /// Releases `peripheral` by forgetting its session binding so the OS will
    /// not reconnect it behind the peer's back.  A disconnected device is left
    /// alone.
    pub async fn unregister(&self, peripheral: &Peripheral) -> Result<(), RegistryError> {
        self.ensure_powered()?;
        let id = peripheral.id.clone();
        self.queue
            .run(move |adapter| {
                let device = resolve_or_not_found(adapter, &id)?;
                if !adapter.is_connected(&device) {
                    debug!(%id, "already disconnected; nothing to release");
                    return Ok(());
                }
                if adapter.forget(&device) {
                    info!(%id, "peripheral released");
                    Ok(())
                } else {
                    Err(RegistryError::DisconnectFailed(FORGET_REJECTED))
                }
            })
            .await?
    }

    /// Closes the connection to `peripheral` without forgetting it.
    pub async fn disconnect(&self, peripheral: &Peripheral) -> Result<(), RegistryError> {
        self.ensure_powered()?;
        let id = peripheral.id.clone();
        self.queue
            .run(move |adapter| {
                let device = resolve_or_not_found(adapter, &id)?;
                if !adapter.is_connected(&device) {
                    return Ok(());
                }
                adapter
                    .close_connection(&device)
                    .map_err(RegistryError::DisconnectFailed)
            })
            .await?
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.peripherals) {
            error!(error = %e, "failed to persist peripheral list");
        }
    }
}

fn resolve_or_not_found(
    adapter: &dyn AdapterController,
    id: &str,
) -> Result<DeviceHandle, RegistryError> {
    adapter
        .resolve(id)
        .ok_or_else(|| RegistryError::DeviceNotFound(id.to_string()))
}

/// Runs on the adapter thread.  Returns the name the adapter reports.
fn connect_device(
    adapter: &dyn AdapterController,
    id: &str,
) -> Result<Option<String>, RegistryError> {
    if adapter.power_state() == PowerState::Off {
        return Err(RegistryError::AdapterPoweredOff);
    }
    let device = resolve_or_not_found(adapter, id)?;

    if adapter.rssi(&device) == RSSI_UNAVAILABLE {
        return Err(RegistryError::OutOfRange(id.to_string()));
    }
    adapter.pair(&device).map_err(RegistryError::PairingFailed)?;
    adapter
        .open_connection(&device)
        .map_err(RegistryError::ConnectFailed)?;

    if !adapter.is_connected(&device) {
        return Err(RegistryError::ConnectFailed(UNCONFIRMED_CONNECTION));
    }
    Ok(device.name)
}

/// Keeps the first occurrence of each id.
fn dedupe(list: Vec<Peripheral>) -> Vec<Peripheral> {
    let mut out: Vec<Peripheral> = Vec::with_capacity(list.len());
    for p in list {
        if !out.iter().any(|seen| seen.id == p.id) {
            out.push(p);
        }
    }
    out
}
