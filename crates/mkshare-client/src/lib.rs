//! mkshare-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does mkshare-client do?
//!
//! The *client* is the controlled peer: the machine whose keyboard and mouse
//! are driven by the controller.  When the controller's cursor dwells on a
//! configured screen edge, the controller sends `ControlTransfer{ToRemote}`
//! and starts forwarding its input over TCP.
//!
//! The client:
//!
//! 1. Dials the controller and completes the version/role handshake.
//! 2. Keeps the session alive with heartbeats, and reconnects with backoff
//!    when the link drops or the controller goes silent.
//! 3. Places its cursor at the entry edge on `ToRemote`, replays `Input`
//!    events in order, and releases anything still held on `ToLocal`.

/// Application layer: use cases for the client.
pub mod application;

/// Infrastructure layer: OS adapters, network, and storage.
pub mod infrastructure;
