//! Domain entities for PeriSwitch.
//!
//! Pure data and rules with no infrastructure dependencies: the peripherals a
//! host manages, the peer host it hands them to, and the outcome of a peer
//! liveness probe.
//!
//! Connection state is deliberately absent from [`peripheral::Peripheral`].
//! The Bluetooth adapter is the only authority on whether a device is
//! connected, so callers derive [`peripheral::ConnectionStatus`] from fresh
//! adapter readings every time they need it.

pub mod health;
pub mod peer;
pub mod peripheral;
