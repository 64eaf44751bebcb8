//! Session handshake.
//!
//! The controlled peer dials and speaks first:
//!
//! ```text
//! controlled                         controller
//!     │ ── Handshake{Controlled, v, id} ──▶ │
//!     │ ◀── HandshakeAck{Accepted|Rejected} │
//! ```
//!
//! The protocol version must match exactly.  Both sides bound the exchange
//! with a timeout so a silent peer cannot hold a slot open.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::messages::{
    ErrorCode, ErrorMessage, HandshakeAckMessage, HandshakeMessage, HandshakeStatus, Message,
    PeerRole, PROTOCOL_VERSION,
};
use crate::transport::error::SessionError;
use crate::transport::link::{Inbound, LinkReader, LinkWriter};

/// Runs the dialing side of the handshake.
///
/// # Errors
///
/// - [`SessionError::HandshakeRejected`] if the controller said no.
/// - [`SessionError::HandshakeTimeout`] if no ack arrived within `timeout`.
/// - [`SessionError::Closed`] if the stream ended first.
pub async fn handshake_initiator(
    reader: &mut LinkReader,
    writer: &LinkWriter,
    client_id: Uuid,
    timeout: Duration,
) -> Result<(), SessionError> {
    let exchange = async {
        writer
            .send(Message::Handshake(HandshakeMessage {
                role: PeerRole::Controlled,
                protocol_version: PROTOCOL_VERSION,
                client_id,
            }))
            .await?;
        debug!(%client_id, "sent handshake");

        match reader.next_frame().await? {
            Some(Inbound::Message {
                message: Message::HandshakeAck(ack),
                ..
            }) => Ok::<_, SessionError>(ack),
            Some(Inbound::Message { message, .. }) => Err(SessionError::UnexpectedMessage {
                got: message.message_type(),
                during: "handshake",
            }),
            Some(Inbound::Unknown { type_byte, .. }) => {
                warn!(type_byte, "unknown frame type during handshake");
                Err(SessionError::Closed)
            }
            None => Err(SessionError::Closed),
        }
    };

    let ack = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| SessionError::HandshakeTimeout)??;

    match ack.status {
        HandshakeStatus::Accepted => {
            info!(%client_id, "handshake accepted");
            Ok(())
        }
        HandshakeStatus::Rejected => {
            let reason = ack.reason.unwrap_or_else(|| "no reason given".to_string());
            warn!(%reason, "handshake rejected");
            Err(SessionError::HandshakeRejected { reason })
        }
    }
}

/// Runs the listening side of the handshake and returns the peer's hello.
///
/// A version mismatch or a peer that does not declare the controlled role is
/// answered with `HandshakeAck{Rejected}` before the error is returned.
///
/// # Errors
///
/// As for [`handshake_initiator`]; a rejection yields
/// [`SessionError::HandshakeRejected`] carrying the reason sent to the peer.
pub async fn handshake_responder(
    reader: &mut LinkReader,
    writer: &LinkWriter,
    timeout: Duration,
) -> Result<HandshakeMessage, SessionError> {
    let first = tokio::time::timeout(timeout, reader.next_frame())
        .await
        .map_err(|_| SessionError::HandshakeTimeout)??;

    let hello = match first {
        Some(Inbound::Message {
            message: Message::Handshake(hello),
            ..
        }) => hello,
        Some(Inbound::Message { message, .. }) => {
            let got = message.message_type();
            reply_error(
                writer,
                ErrorCode::UnexpectedMessage,
                format!("expected handshake, got {got:?}"),
            )
            .await;
            return Err(SessionError::UnexpectedMessage {
                got,
                during: "handshake",
            });
        }
        Some(Inbound::Unknown { type_byte, .. }) => {
            reply_error(
                writer,
                ErrorCode::UnknownMessageType,
                format!("unknown message type 0x{type_byte:02X}"),
            )
            .await;
            return Err(SessionError::Closed);
        }
        None => return Err(SessionError::Closed),
    };

    let rejection = if hello.protocol_version != PROTOCOL_VERSION {
        Some(format!(
            "protocol version {} not supported (expected {PROTOCOL_VERSION})",
            hello.protocol_version
        ))
    } else if hello.role != PeerRole::Controlled {
        Some(format!("peer role {:?} cannot connect to a controller", hello.role))
    } else {
        None
    };

    if let Some(reason) = rejection {
        warn!(client_id = %hello.client_id, %reason, "rejecting handshake");
        writer
            .send(Message::HandshakeAck(HandshakeAckMessage::rejected(reason.clone())))
            .await?;
        return Err(SessionError::HandshakeRejected { reason });
    }

    writer
        .send(Message::HandshakeAck(HandshakeAckMessage::accepted()))
        .await?;
    info!(client_id = %hello.client_id, "handshake accepted");
    Ok(hello)
}

/// Best-effort `Error` frame; the session is ending either way.
async fn reply_error(writer: &LinkWriter, code: ErrorCode, message: String) {
    if let Err(e) = writer
        .send(Message::Error(ErrorMessage { code, message }))
        .await
    {
        debug!(error = %e, "could not send error frame");
    }
}
