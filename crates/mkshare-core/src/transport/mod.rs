//! Async transport shared by both peers.
//!
//! Everything here works over any `AsyncRead + AsyncWrite` byte stream, so
//! production code passes a `TcpStream` and tests pass one end of
//! `tokio::io::duplex`.
//!
//! - [`split_link`] wraps a stream into a [`LinkReader`] and a cloneable
//!   [`LinkWriter`].
//! - [`handshake_initiator`] / [`handshake_responder`] run the version and
//!   role check.
//! - [`run_active`] drives an established session: heartbeats, liveness,
//!   inbound dispatch and graceful shutdown.  [`run_active_observed`] also
//!   reports [`LinkActivity`] as heartbeats come and go.

pub mod active;
pub mod error;
pub mod handshake;
pub mod link;

pub use active::{
    run_active, run_active_observed, EndReason, InboundMessage, LinkActivity, SessionEnd,
};
pub use error::SessionError;
pub use handshake::{handshake_initiator, handshake_responder};
pub use link::{split_link, Inbound, LinkReader, LinkWriter};

pub use crate::domain::session::LivenessConfig;
