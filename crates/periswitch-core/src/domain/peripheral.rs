//! Managed peripherals and the aggregate ownership status derived from them.

use serde::{Deserialize, Serialize};

/// A Bluetooth peripheral this host manages.
///
/// `id` is the stable hardware address and is unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peripheral {
    /// Hardware address, e.g. `"a4-83-e7-11-22-33"`.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Peripheral {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Aggregate connection status over the whole peripheral set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// The set is non-empty and every queried peripheral is connected.
    AllConnected,
    /// No queried peripheral is connected (includes the empty set).
    AllDisconnected,
    /// Some, but not all, queried peripherals are connected.
    Partial,
}

impl ConnectionStatus {
    /// Folds a sequence of per-peripheral `is_connected` readings into a status.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use periswitch_core::ConnectionStatus;
    ///
    /// assert_eq!(ConnectionStatus::from_readings(Vec::new()), ConnectionStatus::AllDisconnected);
    /// assert_eq!(ConnectionStatus::from_readings([true, true]), ConnectionStatus::AllConnected);
    /// assert_eq!(ConnectionStatus::from_readings([true, false]), ConnectionStatus::Partial);
    /// ```
    pub fn from_readings<I>(readings: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let (connected, total) = readings
            .into_iter()
            .fold((0usize, 0usize), |(c, t), r| (c + usize::from(r), t + 1));

        if total > 0 && connected == total {
            ConnectionStatus::AllConnected
        } else if connected == 0 {
            ConnectionStatus::AllDisconnected
        } else {
            ConnectionStatus::Partial
        }
    }

    /// `true` unless every peripheral is still connected.
    ///
    /// This is the condition the convergence poll waits for after a release.
    pub fn is_released(self) -> bool {
        self != ConnectionStatus::AllConnected
    }
}
