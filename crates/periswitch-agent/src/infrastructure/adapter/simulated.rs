//! In-memory Bluetooth adapter.
//!
//! Models what the handoff logic depends on: radio power, paired devices,
//! connection state, RSSI (including the `127` "no reading" sentinel), and
//! driver failure codes.
//!
//! After `forget` or `close_connection`, a device keeps reading as connected
//! for `release_lag` more `is_connected` queries, the way a real radio takes a
//! moment to drop the link.  Every mutating call is appended to a call log.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::application::adapter_queue::{AdapterCode, AdapterController, DeviceHandle, PowerState};

/// Signal strength given to devices unless a test says otherwise.
pub const DEFAULT_RSSI: i32 = -50;

/// A device known to the simulated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedDevice {
    pub address: String,
    pub name: Option<String>,
    pub connected: bool,
    pub paired: bool,
    pub rssi: i32,
}

impl SimulatedDevice {
    /// A paired, disconnected, in-range device.
    pub fn new(address: &str, name: &str) -> Self {
        Self {
            address: address.to_string(),
            name: Some(name.to_string()),
            connected: false,
            paired: true,
            rssi: DEFAULT_RSSI,
        }
    }

    /// A device that reports no name.
    pub fn nameless(address: &str) -> Self {
        Self {
            name: None,
            ..Self::new(address, "")
        }
    }

    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    pub fn with_rssi(mut self, rssi: i32) -> Self {
        self.rssi = rssi;
        self
    }

    fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            address: self.address.clone(),
            name: self.name.clone(),
        }
    }
}

/// A mutating call received by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    Pair(String),
    Open(String),
    Close(String),
    Forget(String),
}

#[derive(Debug)]
struct DeviceState {
    device: SimulatedDevice,
    /// Remaining `is_connected` reads that still report a released link.
    lingering: u32,
}

#[derive(Debug)]
struct Inner {
    powered: bool,
    devices: Vec<DeviceState>,
    pair_failures: HashMap<String, AdapterCode>,
    connect_failures: HashMap<String, AdapterCode>,
    forget_rejections: Vec<String>,
    release_lag: u32,
    calls: Vec<AdapterCall>,
}

impl Inner {
    fn device_mut(&mut self, address: &str) -> Option<&mut DeviceState> {
        self.devices.iter_mut().find(|d| d.device.address == address)
    }
}

/// Thread-safe simulated adapter.
#[derive(Debug)]
pub struct SimulatedAdapter {
    inner: Mutex<Inner>,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdapter {
    /// A powered-on adapter with no devices.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                powered: true,
                devices: Vec::new(),
                pair_failures: HashMap::new(),
                connect_failures: HashMap::new(),
                forget_rejections: Vec::new(),
                release_lag: 0,
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a device.
    pub fn insert(&self, device: SimulatedDevice) {
        let mut state = self.state();
        state.devices.retain(|d| d.device.address != device.address);
        state.devices.push(DeviceState {
            device,
            lingering: 0,
        });
    }

    pub fn set_powered(&self, powered: bool) {
        self.state().powered = powered;
    }

    pub fn set_connected(&self, address: &str, connected: bool) {
        if let Some(d) = self.state().device_mut(address) {
            d.device.connected = connected;
            d.lingering = 0;
        }
    }

    pub fn set_rssi(&self, address: &str, rssi: i32) {
        if let Some(d) = self.state().device_mut(address) {
            d.device.rssi = rssi;
        }
    }

    /// Makes `pair` fail for `address` with `code`.
    pub fn fail_pairing(&self, address: &str, code: AdapterCode) {
        self.state().pair_failures.insert(address.to_string(), code);
    }

    /// Makes `open_connection` fail for `address` with `code`.
    pub fn fail_connect(&self, address: &str, code: AdapterCode) {
        self.state().connect_failures.insert(address.to_string(), code);
    }

    /// Makes `forget` refuse `address`.
    pub fn reject_forget(&self, address: &str) {
        self.state().forget_rejections.push(address.to_string());
    }

    /// Number of reads a released device keeps reporting connected.
    pub fn set_release_lag(&self, reads: u32) {
        self.state().release_lag = reads;
    }

    /// Connection state without consuming a lagging read.
    pub fn is_device_connected(&self, address: &str) -> bool {
        self.state()
            .device_mut(address)
            .map(|d| d.device.connected || d.lingering > 0)
            .unwrap_or(false)
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.state().calls.clone()
    }
}

impl AdapterController for SimulatedAdapter {
    fn power_state(&self) -> PowerState {
        if self.state().powered {
            PowerState::On
        } else {
            PowerState::Off
        }
    }

    fn resolve(&self, address: &str) -> Option<DeviceHandle> {
        self.state().device_mut(address).map(|d| d.device.handle())
    }

    fn paired_devices(&self) -> Vec<DeviceHandle> {
        self.state()
            .devices
            .iter()
            .filter(|d| d.device.paired)
            .map(|d| d.device.handle())
            .collect()
    }

    fn is_connected(&self, device: &DeviceHandle) -> bool {
        let mut state = self.state();
        let Some(d) = state.device_mut(&device.address) else {
            return false;
        };
        if d.device.connected {
            return true;
        }
        if d.lingering > 0 {
            if d.lingering != u32::MAX {
                d.lingering -= 1;
            }
            return true;
        }
        false
    }

    fn rssi(&self, device: &DeviceHandle) -> i32 {
        self.state()
            .device_mut(&device.address)
            .map(|d| d.device.rssi)
            .unwrap_or(crate::application::adapter_queue::RSSI_UNAVAILABLE)
    }

    fn pair(&self, device: &DeviceHandle) -> Result<(), AdapterCode> {
        let mut state = self.state();
        state.calls.push(AdapterCall::Pair(device.address.clone()));
        if let Some(code) = state.pair_failures.get(&device.address).copied() {
            return Err(code);
        }
        if let Some(d) = state.device_mut(&device.address) {
            d.device.paired = true;
        }
        Ok(())
    }

    fn open_connection(&self, device: &DeviceHandle) -> Result<(), AdapterCode> {
        let mut state = self.state();
        state.calls.push(AdapterCall::Open(device.address.clone()));
        if let Some(code) = state.connect_failures.get(&device.address).copied() {
            return Err(code);
        }
        if let Some(d) = state.device_mut(&device.address) {
            d.device.connected = true;
            d.lingering = 0;
        }
        debug!(address = %device.address, "simulated link opened");
        Ok(())
    }

    fn close_connection(&self, device: &DeviceHandle) -> Result<(), AdapterCode> {
        let mut state = self.state();
        state.calls.push(AdapterCall::Close(device.address.clone()));
        let lag = state.release_lag;
        if let Some(d) = state.device_mut(&device.address) {
            d.device.connected = false;
            d.lingering = lag;
        }
        Ok(())
    }

    fn forget(&self, device: &DeviceHandle) -> bool {
        let mut state = self.state();
        state.calls.push(AdapterCall::Forget(device.address.clone()));
        if state.forget_rejections.contains(&device.address) {
            return false;
        }
        let lag = state.release_lag;
        if let Some(d) = state.device_mut(&device.address) {
            d.device.connected = false;
            d.device.paired = false;
            d.lingering = lag;
        }
        debug!(address = %device.address, "simulated device forgotten");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(address: &str) -> DeviceHandle {
        DeviceHandle {
            address: address.to_string(),
            name: None,
        }
    }

    #[test]
    fn test_unknown_device_does_not_resolve() {
        let adapter = SimulatedAdapter::new();
        assert!(adapter.resolve("nope").is_none());
    }

    #[test]
    fn test_release_lag_counts_down_reads() {
        // Arrange
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb").connected(true));
        adapter.set_release_lag(2);

        // Act
        assert!(adapter.forget(&handle("kb")));

        // Assert
        assert!(adapter.is_connected(&handle("kb")));
        assert!(adapter.is_connected(&handle("kb")));
        assert!(!adapter.is_connected(&handle("kb")));
    }

    #[test]
    fn test_forgotten_device_leaves_paired_list() {
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb").connected(true));
        adapter.insert(SimulatedDevice::new("mouse", "mouse"));

        adapter.forget(&handle("kb"));

        let paired: Vec<_> = adapter.paired_devices().into_iter().map(|d| d.address).collect();
        assert_eq!(paired, vec!["mouse".to_string()]);
        assert!(adapter.resolve("kb").is_some());
    }

    #[test]
    fn test_injected_failures_are_returned() {
        let adapter = SimulatedAdapter::new();
        adapter.insert(SimulatedDevice::new("kb", "kb"));
        adapter.fail_pairing("kb", 31);
        adapter.fail_connect("kb", 4);
        adapter.reject_forget("kb");

        assert_eq!(adapter.pair(&handle("kb")), Err(31));
        assert_eq!(adapter.open_connection(&handle("kb")), Err(4));
        assert!(!adapter.forget(&handle("kb")));
        assert_eq!(adapter.calls().len(), 3);
    }

    #[test]
    fn test_power_toggle() {
        let adapter = SimulatedAdapter::new();
        adapter.set_powered(false);
        assert_eq!(adapter.power_state(), PowerState::Off);
    }
}
