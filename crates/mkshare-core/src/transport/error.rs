//! Session-level error type.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::codec::{CodecError, ProtocolError};
use crate::protocol::messages::MessageType;

/// Anything that ends a session.
///
/// The controlled peer treats every variant as a reason to reconnect; the
/// controller frees its peer slot and takes ownership back.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handshake rejected: {reason}")]
    HandshakeRejected { reason: String },

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("no frames from peer for {silent_for:?}")]
    LivenessTimeout { silent_for: Duration },

    /// A known message arrived where the protocol does not allow it.
    #[error("unexpected {got:?} message during {during}")]
    UnexpectedMessage {
        got: MessageType,
        during: &'static str,
    },

    /// The peer closed the stream, or the local side dropped it.
    #[error("connection closed")]
    Closed,

    /// The outbound queue to the peer is full; the message was not sent.
    #[error("outbound queue full")]
    OutboundFull,
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => SessionError::Transport(e),
            CodecError::Protocol(e) => SessionError::Protocol(e),
        }
    }
}
