//! Application layer use cases for the controlled peer.
//!
//! - **`emulate_input`** – Applies the controller's stream in order: switches
//!   between idle and injecting on `ControlTransfer`, replays `Input` through
//!   a `PlatformInputEmulator` injected at construction time, and drops stale
//!   frames by `(epoch, sequence)`.

pub mod emulate_input;
