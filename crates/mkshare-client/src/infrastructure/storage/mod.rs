//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads `client.toml` from the platform config
//! directory, supplies defaults on first run, and writes it back when asked.

pub mod config;
