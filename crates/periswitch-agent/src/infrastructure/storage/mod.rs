//! Storage infrastructure: configuration file and registry persistence.
//!
//! - **`config`** – Reads the TOML configuration from the platform directory
//!   (or `--config`), with defaults for everything on first run.
//! - **`store`** – File and in-memory key-value backends plus the JSON
//!   `Store<T>` the registries persist through.

pub mod config;
pub mod store;
