//! Bluetooth adapter backends.
//!
//! The OS driver is an external collaborator reached through
//! `application::adapter_queue::AdapterController`.  This module provides the
//! simulated backend the headless binary and the test suites run against.

pub mod simulated;

pub use simulated::{AdapterCall, SimulatedAdapter, SimulatedDevice};

use crate::infrastructure::storage::config::AdapterConfig;

/// Builds the simulated adapter described by the `[adapter]` config section.
pub fn from_config(config: &AdapterConfig) -> SimulatedAdapter {
    let adapter = SimulatedAdapter::new();
    adapter.set_powered(config.powered);
    for entry in &config.devices {
        let mut device = match &entry.name {
            Some(name) => SimulatedDevice::new(&entry.address, name),
            None => SimulatedDevice::nameless(&entry.address),
        };
        device = device.connected(entry.connected).with_rssi(entry.rssi);
        adapter.insert(device);
    }
    adapter
}
