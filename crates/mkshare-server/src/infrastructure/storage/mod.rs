//! Storage infrastructure: the controller's `server.toml`.
//!
//! Loading falls back to defaults when the file is missing, so a first run
//! needs no setup.

pub mod config;
