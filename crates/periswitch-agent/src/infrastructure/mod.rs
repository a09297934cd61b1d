//! Infrastructure layer for the agent.
//!
//! Contains the OS-facing adapters: the Bluetooth adapter backend, network
//! sockets and mDNS, file-system storage, notifications, and the composition
//! root that wires them into the application layer.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `periswitch_core`, but MUST NOT be imported by the `application` layer.

pub mod adapter;
pub mod network;
pub mod notification;
pub mod storage;
pub mod ui_bridge;
