//! Application layer use cases for the agent.
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (`periswitch-core`) and the infrastructure (adapter, sockets, disk).
//!
//! Use cases in this layer:
//!
//! - **Orchestrate** domain objects to fulfil a user goal (e.g., "move every
//!   peripheral to the other host").
//! - **Depend on abstractions** (traits) rather than concrete implementations,
//!   so the infrastructure can be swapped without changing this code.
//! - **Contain no sockets and no file system access**.  Blocking adapter calls
//!   are confined to the [`adapter_queue`] worker thread.
//!
//! # Sub-modules
//!
//! - **`adapter_queue`** – The Bluetooth adapter capability and the serial
//!   queue its mutating calls run on.
//! - **`persistence`** – `Store<T>` / `KeyValueStore` ports.
//! - **`peripheral_registry`** – Registered peripherals, live status, connect
//!   and release pipelines.
//! - **`peer_registry`** – Discovered hosts and the registered handoff peer.
//! - **`ownership`** – Batch release/acquire and the convergence poll.
//! - **`handoff`** – The coordinator state machine triggered by the user.
//! - **`command_handler`** – Executes commands received from the peer.
//! - **`notify`** – Notification port and the fixed message table.

pub mod adapter_queue;
pub mod command_handler;
pub mod handoff;
pub mod notify;
pub mod ownership;
pub mod peer_registry;
pub mod peripheral_registry;
pub mod persistence;
