//! # mkshare-core
//!
//! Shared library for MKShare containing the wire protocol, the pure domain
//! state machines, and the async transport used by both peers.
//!
//! MKShare lets one machine's keyboard and mouse (the *controller*) drive a
//! second machine (the *controlled* peer) over the local network.  When the
//! controller's cursor rests against a configured screen edge long enough,
//! input ownership moves to the peer; a recall key brings it back.
//!
//! - **`protocol`** – Message types and the length-prefixed, CRC-32 checked
//!   frame codec, plus per-session sequence numbering.
//!
//! - **`domain`** – Screen geometry, the edge-dwell ownership machine, and the
//!   session lifecycle.  No I/O; timestamps are injected.
//!
//! - **`transport`** – Tokio plumbing over any `AsyncRead + AsyncWrite`:
//!   framed link halves, the handshake, and the heartbeat/liveness loop.

pub mod domain;
pub mod protocol;
pub mod transport;

pub use domain::geometry::{
    DisplayBounds, Edge, ScreenEnumerator, ScreenGeometry, ScreenInfoError,
    StaticScreenEnumerator,
};
pub use domain::ownership::{
    Owner, OwnershipConfig, OwnershipMachine, OwnershipTransition, PointerSample,
};
pub use domain::session::{
    LivenessConfig, ReconnectPolicy, SessionEvent, SessionLifecycle, SessionSnapshot,
    SessionState,
};
pub use protocol::codec::{FrameCodec, ProtocolError};
pub use protocol::messages::Message;
pub use transport::SessionError;
