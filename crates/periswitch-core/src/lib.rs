//! # periswitch-core
//!
//! Shared library for PeriSwitch containing the command wire protocol and the
//! domain entities exchanged between the two hosts.
//!
//! It has zero dependencies on OS APIs, Bluetooth drivers, or network sockets.
//!
//! # Architecture overview
//!
//! PeriSwitch moves a fixed set of Bluetooth peripherals (keyboard, mouse,
//! trackpad) between exactly two hosts on the same LAN with a single gesture,
//! making sure both hosts never hold the peripherals at the same time for
//! longer than a short grace window.
//!
//! - **`protocol`** – The fixed command vocabulary (`HEALTH_CHECK`,
//!   `CONNECT_ALL`, ...) and the plain-text frame codec used for every
//!   one-shot TCP exchange.
//!
//! - **`domain`** – `Peripheral`, `PeerHost`, the derived `ConnectionStatus`
//!   and `HealthCheckResult`.

pub mod domain;
pub mod protocol;

pub use domain::health::HealthCheckResult;
pub use domain::peer::{unix_now_secs, PeerHost};
pub use domain::peripheral::{ConnectionStatus, Peripheral};
pub use protocol::codec::{decode_frame, encode_frame, Frame, ProtocolError};
pub use protocol::command::Command;
