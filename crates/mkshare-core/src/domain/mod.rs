//! Pure decision logic for MKShare.
//!
//! Nothing in this module performs I/O or reads a clock on its own.  Callers
//! pass timestamps in, which keeps every state machine here deterministic
//! under test.
//!
//! - [`geometry`] describes the local displays and their outer edges.
//! - [`ownership`] decides when input ownership crosses to the peer.
//! - [`session`] tracks the connection lifecycle of the controlled peer.

pub mod geometry;
pub mod ownership;
pub mod session;
