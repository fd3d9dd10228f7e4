//! The vaultd daemon: an offline signing vault for the Sia network.
//!
//! The daemon stores encrypted root seeds, derives signing keys from them,
//! and signs v1 and v2 transactions over a small authenticated HTTP API.
//! This crate wires the vault core and store to the outside world: YAML
//! configuration with environment overrides, tracing-based logging, the
//! axum HTTP surface, and the explorer-backed chain-tip client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod chain;
pub mod config;
pub mod logging;
