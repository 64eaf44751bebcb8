//! Network infrastructure for the controller.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP port, accepts controlled peers, and runs
//!   each one through the handshake and the heartbeat/liveness loop.
//!
//! - **`peer_slot`** – The single-peer admission policy.  Also the router's
//!   outbound message sink once a peer is active.

pub mod listener;
pub mod peer_slot;

pub use listener::{NetworkError, PeerListener, SessionSettings};
pub use peer_slot::{PeerReservation, PeerSlot};
