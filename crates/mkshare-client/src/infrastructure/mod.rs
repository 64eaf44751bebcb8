//! Infrastructure layer for the controlled peer.
//!
//! Contains OS-facing adapters: input emulation, the TCP connection to the
//! controller, and config file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mkshare_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.
//!
//! # Sub-modules
//!
//! - **`input_emulation`** – `PlatformInputEmulator` adapters.  A recording
//!   `MockInputEmulator` is provided for tests and headless runs.
//!
//! - **`network`** – TCP client that dials the controller, runs the
//!   handshake and heartbeat loop, and reconnects with backoff if the link
//!   drops.
//!
//! - **`storage`** – `client.toml` load/save.

pub mod input_emulation;
pub mod network;
pub mod storage;
