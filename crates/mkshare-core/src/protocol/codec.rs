//! Binary codec for MKShare frames.
//!
//! Wire format:
//! ```text
//! [length:4][type:1][sequence:4][payload:length-5][crc32:4]
//! ```
//! `length` counts the type byte, the sequence number, and the payload.  The
//! trailing CRC-32 (IEEE) covers exactly those `length` bytes.  All multi-byte
//! integers are big-endian.
//!
//! Decoding is split in two layers:
//!
//! - [`decode_frame`] is a pure function over a byte slice.  It never
//!   consumes input on its own; it reports how many bytes a complete frame
//!   occupied, or [`Decoded::NeedMoreData`].
//! - [`FrameCodec`] adapts it to `tokio_util::codec` so a `FramedRead` can
//!   feed it arbitrary chunks from a socket and keep partial frames buffered
//!   between reads.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use uuid::Uuid;

use crate::domain::geometry::Edge;
use crate::protocol::keys::{KeyCode, Modifiers};
use crate::protocol::messages::{
    ControlTransferMessage, DisconnectReason, ErrorCode, ErrorMessage, HandshakeAckMessage,
    HandshakeMessage, HandshakeStatus, InputEvent, InputKind, Message, MessageType, MouseButton,
    PeerRole, PressState, ScreenInfoMessage, TransferDirection,
};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;
/// Type byte plus sequence number.
pub const FRAME_HEADER_SIZE: usize = 5;
/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 4;
/// Largest accepted value of the length field.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors that can occur during frame encoding or decoding.
///
/// Every variant is fatal to the connection it was observed on: a byte
/// stream that produced one cannot be resynchronised.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The length prefix is outside `FRAME_HEADER_SIZE..=MAX_FRAME_LEN`.
    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch: frame says 0x{declared:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch { declared: u32, computed: u32 },

    /// A known message type carried a payload that could not be parsed,
    /// including one with bytes left over after the last field.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded message would exceed [`MAX_FRAME_LEN`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// A message together with its per-session sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u32,
    pub message: Message,
}

/// Outcome of a single [`decode_frame`] call.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// A complete, verified frame occupying `consumed` bytes.
    Frame { frame: Frame, consumed: usize },
    /// A checksum-valid frame whose type this build does not know.
    /// The frame must still be skipped (`consumed` bytes).
    UnknownType {
        type_byte: u8,
        sequence: u32,
        consumed: usize,
    },
    /// The buffer does not yet hold a complete frame.
    NeedMoreData,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `frame` into a complete wire frame, checksum included.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the payload does not fit.
///
/// # Examples
///
/// ```rust
/// use mkshare_core::protocol::codec::{decode_frame, encode_frame, Decoded, Frame};
/// use mkshare_core::protocol::messages::Message;
///
/// let frame = Frame { sequence: 7, message: Message::Heartbeat { timestamp_ms: 42 } };
/// let bytes = encode_frame(&frame).unwrap();
/// match decode_frame(&bytes).unwrap() {
///     Decoded::Frame { frame: decoded, consumed } => {
///         assert_eq!(decoded, frame);
///         assert_eq!(consumed, bytes.len());
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(&frame.message);
    let length = FRAME_HEADER_SIZE + payload.len();
    if length > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + length + CHECKSUM_SIZE);
    buf.extend_from_slice(&(length as u32).to_be_bytes());
    buf.push(frame.message.message_type() as u8);
    buf.extend_from_slice(&frame.sequence.to_be_bytes());
    buf.extend_from_slice(&payload);

    let crc = crc32fast::hash(&buf[LENGTH_PREFIX_SIZE..]);
    buf.extend_from_slice(&crc.to_be_bytes());
    Ok(buf)
}

/// Attempts to decode one frame from the start of `bytes`.
///
/// Never reads past the first frame; the caller advances its buffer by the
/// reported `consumed` count.
///
/// # Errors
///
/// Returns [`ProtocolError`] for an out-of-range length, a checksum mismatch,
/// or a malformed payload of a known message type.
pub fn decode_frame(bytes: &[u8]) -> Result<Decoded, ProtocolError> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Ok(Decoded::NeedMoreData);
    }

    let length = read_u32(bytes, 0)? as usize;
    if !(FRAME_HEADER_SIZE..=MAX_FRAME_LEN).contains(&length) {
        return Err(ProtocolError::CorruptFrame(format!(
            "length field {length} outside {FRAME_HEADER_SIZE}..={MAX_FRAME_LEN}"
        )));
    }

    let total = LENGTH_PREFIX_SIZE + length + CHECKSUM_SIZE;
    if bytes.len() < total {
        return Ok(Decoded::NeedMoreData);
    }

    let body = &bytes[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + length];
    let declared = read_u32(bytes, LENGTH_PREFIX_SIZE + length)?;
    let computed = crc32fast::hash(body);
    if declared != computed {
        return Err(ProtocolError::ChecksumMismatch { declared, computed });
    }

    let type_byte = body[0];
    let sequence = read_u32(body, 1)?;
    let payload = &body[FRAME_HEADER_SIZE..];

    match MessageType::try_from(type_byte) {
        Ok(msg_type) => {
            let message = decode_payload(msg_type, payload)?;
            Ok(Decoded::Frame {
                frame: Frame { sequence, message },
                consumed: total,
            })
        }
        Err(()) => Ok(Decoded::UnknownType {
            type_byte,
            sequence,
            consumed: total,
        }),
    }
}

// ── Stream codec ──────────────────────────────────────────────────────────────

/// Error type produced by [`FrameCodec`] when used with `tokio_util` framing.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Item yielded by [`FrameCodec`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    Frame(Frame),
    UnknownType { type_byte: u8, sequence: u32 },
}

/// Resumable `tokio_util` codec over [`encode_frame`] / [`decode_frame`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = DecodedFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src)? {
            Decoded::NeedMoreData => {
                // Reserve the remainder of the frame once the length is known.
                if src.len() >= LENGTH_PREFIX_SIZE {
                    let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
                    let total = LENGTH_PREFIX_SIZE + length + CHECKSUM_SIZE;
                    src.reserve(total.saturating_sub(src.len()));
                }
                Ok(None)
            }
            Decoded::Frame { frame, consumed } => {
                src.advance(consumed);
                Ok(Some(DecodedFrame::Frame(frame)))
            }
            Decoded::UnknownType {
                type_byte,
                sequence,
                consumed,
            } => {
                src.advance(consumed);
                Ok(Some(DecodedFrame::UnknownType {
                    type_byte,
                    sequence,
                }))
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = encode_frame(&item)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        Message::Handshake(m) => encode_handshake(&mut buf, m),
        Message::HandshakeAck(m) => encode_handshake_ack(&mut buf, m),
        Message::Heartbeat { timestamp_ms } => buf.extend_from_slice(&timestamp_ms.to_be_bytes()),
        Message::Disconnect { reason } => buf.push(*reason as u8),
        Message::ScreenInfo(m) => {
            buf.extend_from_slice(&m.width.to_be_bytes());
            buf.extend_from_slice(&m.height.to_be_bytes());
        }
        Message::Input(event) => encode_input(&mut buf, event),
        Message::ControlTransfer(m) => encode_control_transfer(&mut buf, m),
        Message::Error(m) => encode_error(&mut buf, m),
    }
    buf
}

fn encode_handshake(buf: &mut Vec<u8>, m: &HandshakeMessage) {
    buf.push(m.role as u8);
    buf.push(m.protocol_version);
    buf.extend_from_slice(m.client_id.as_bytes());
}

fn encode_handshake_ack(buf: &mut Vec<u8>, m: &HandshakeAckMessage) {
    buf.push(m.status as u8);
    match &m.reason {
        Some(reason) => {
            buf.push(0x01);
            write_length_prefixed_string(buf, reason);
        }
        None => buf.push(0x00),
    }
}

fn encode_input(buf: &mut Vec<u8>, event: &InputEvent) {
    buf.push(event.kind() as u8);
    match *event {
        InputEvent::MouseMove { x, y, dx, dy } => {
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&dx.to_be_bytes());
            buf.extend_from_slice(&dy.to_be_bytes());
        }
        InputEvent::MouseButton {
            button,
            state,
            x,
            y,
        } => {
            buf.push(button as u8);
            buf.push(state as u8);
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
        }
        InputEvent::MouseScroll { dx, dy } => {
            buf.extend_from_slice(&dx.to_be_bytes());
            buf.extend_from_slice(&dy.to_be_bytes());
        }
        InputEvent::Key {
            key,
            state,
            modifiers,
        } => {
            buf.extend_from_slice(&key.0.to_be_bytes());
            buf.push(state as u8);
            buf.push(modifiers.0);
        }
    }
}

fn encode_control_transfer(buf: &mut Vec<u8>, m: &ControlTransferMessage) {
    buf.push(m.direction as u8);
    // 0x00 marks "no edge" (keyboard recall)
    buf.push(m.edge.map_or(0x00, |e| e as u8));
}

fn encode_error(buf: &mut Vec<u8>, m: &ErrorMessage) {
    buf.push(m.code as u8);
    write_length_prefixed_string(buf, &m.message);
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<Message, ProtocolError> {
    match msg_type {
        MessageType::Handshake => decode_handshake(payload).map(Message::Handshake),
        MessageType::HandshakeAck => decode_handshake_ack(payload).map(Message::HandshakeAck),
        MessageType::Heartbeat => {
            require_exact(payload, 8, "Heartbeat")?;
            Ok(Message::Heartbeat {
                timestamp_ms: read_u64(payload, 0)?,
            })
        }
        MessageType::Disconnect => {
            require_exact(payload, 1, "Disconnect")?;
            let reason = DisconnectReason::try_from(payload[0]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown disconnect reason: {}", payload[0]))
            })?;
            Ok(Message::Disconnect { reason })
        }
        MessageType::ScreenInfo => {
            require_exact(payload, 8, "ScreenInfo")?;
            Ok(Message::ScreenInfo(ScreenInfoMessage {
                width: read_u32(payload, 0)?,
                height: read_u32(payload, 4)?,
            }))
        }
        MessageType::Input => decode_input(payload).map(Message::Input),
        MessageType::ControlTransfer => {
            decode_control_transfer(payload).map(Message::ControlTransfer)
        }
        MessageType::Error => decode_error(payload).map(Message::Error),
    }
}

fn decode_handshake(p: &[u8]) -> Result<HandshakeMessage, ProtocolError> {
    // 1 (role) + 1 (version) + 16 (uuid) = 18
    require_exact(p, 18, "Handshake")?;
    let role = PeerRole::try_from(p[0])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown peer role: {}", p[0])))?;
    let protocol_version = p[1];
    let client_id = Uuid::from_bytes(read_array::<16>(p, 2)?);
    Ok(HandshakeMessage {
        role,
        protocol_version,
        client_id,
    })
}

fn decode_handshake_ack(p: &[u8]) -> Result<HandshakeAckMessage, ProtocolError> {
    // 1 (status) + 1 (has_reason) [+ string]
    require_len(p, 2, "HandshakeAck")?;
    let status = match p[0] {
        0x00 => HandshakeStatus::Accepted,
        0x01 => HandshakeStatus::Rejected,
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "unknown handshake status: {other}"
            )))
        }
    };
    let (reason, end) = match p[1] {
        0x00 => (None, 2),
        _ => {
            let (reason, end) = read_length_prefixed_string(p, 2)?;
            (Some(reason), end)
        }
    };
    require_exact(p, end, "HandshakeAck")?;
    Ok(HandshakeAckMessage { status, reason })
}

fn decode_input(p: &[u8]) -> Result<InputEvent, ProtocolError> {
    require_len(p, 1, "Input")?;
    let kind = InputKind::try_from(p[0])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown input kind: {}", p[0])))?;
    let body = &p[1..];
    match kind {
        InputKind::MouseMove => {
            // 4+4+4+4 = 16
            require_exact(body, 16, "Input.MouseMove")?;
            Ok(InputEvent::MouseMove {
                x: read_i32(body, 0)?,
                y: read_i32(body, 4)?,
                dx: read_i32(body, 8)?,
                dy: read_i32(body, 12)?,
            })
        }
        InputKind::MouseButton => {
            // 1+1+4+4 = 10
            require_exact(body, 10, "Input.MouseButton")?;
            let button = MouseButton::try_from(body[0]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown mouse button: {}", body[0]))
            })?;
            let state = decode_press_state(body[1])?;
            Ok(InputEvent::MouseButton {
                button,
                state,
                x: read_i32(body, 2)?,
                y: read_i32(body, 6)?,
            })
        }
        InputKind::MouseScroll => {
            require_exact(body, 8, "Input.MouseScroll")?;
            Ok(InputEvent::MouseScroll {
                dx: read_i32(body, 0)?,
                dy: read_i32(body, 4)?,
            })
        }
        InputKind::Key => {
            // 2 (usage) + 1 (state) + 1 (modifiers) = 4
            require_exact(body, 4, "Input.Key")?;
            Ok(InputEvent::Key {
                key: KeyCode(u16::from_be_bytes(read_array::<2>(body, 0)?)),
                state: decode_press_state(body[2])?,
                modifiers: Modifiers(body[3]),
            })
        }
    }
}

fn decode_press_state(byte: u8) -> Result<PressState, ProtocolError> {
    PressState::try_from(byte)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown press state: {byte}")))
}

fn decode_control_transfer(p: &[u8]) -> Result<ControlTransferMessage, ProtocolError> {
    require_exact(p, 2, "ControlTransfer")?;
    let direction = TransferDirection::try_from(p[0]).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown transfer direction: {}", p[0]))
    })?;
    let edge = match p[1] {
        0x00 => None,
        code => Some(Edge::try_from(code).map_err(|_| {
            ProtocolError::MalformedPayload(format!("unknown edge: {code}"))
        })?),
    };
    Ok(ControlTransferMessage { direction, edge })
}

fn decode_error(p: &[u8]) -> Result<ErrorMessage, ProtocolError> {
    require_len(p, 3, "Error")?;
    let code = ErrorCode::from(p[0]);
    let (message, end) = read_length_prefixed_string(p, 1)?;
    require_exact(p, end, "Error")?;
    Ok(ErrorMessage { code, message })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

/// Like [`require_len`], but trailing bytes are malformed too.
fn require_exact(buf: &[u8], expected: usize, context: &str) -> Result<(), ProtocolError> {
    require_len(buf, expected, context)?;
    if buf.len() > expected {
        return Err(ProtocolError::MalformedPayload(format!(
            "{context}: {} trailing bytes",
            buf.len() - expected
        )));
    }
    Ok(())
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], ProtocolError> {
    buf.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "need {N} bytes at offset {offset}, got {}",
                buf.len().saturating_sub(offset)
            ))
        })
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    read_array::<4>(buf, offset).map(u32::from_be_bytes)
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32, ProtocolError> {
    read_array::<4>(buf, offset).map(i32::from_be_bytes)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    read_array::<8>(buf, offset).map(u64::from_be_bytes)
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let mut end = s.len().min(u16::MAX as usize);
    // Never split a multi-byte character when truncating.
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.extend_from_slice(&(end as u16).to_be_bytes());
    buf.extend_from_slice(&s.as_bytes()[..end]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    let len = u16::from_be_bytes(read_array::<2>(buf, offset)?) as usize;
    let start = offset + 2;
    let bytes = buf.get(start..start + len).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        ))
    })?;
    let s = std::str::from_utf8(bytes)
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) -> Message {
        let frame = Frame {
            sequence: 3,
            message,
        };
        let encoded = encode_frame(&frame).expect("encode failed");
        match decode_frame(&encoded).expect("decode failed") {
            Decoded::Frame { frame: decoded, consumed } => {
                assert_eq!(consumed, encoded.len(), "consumed bytes should equal frame size");
                assert_eq!(decoded.sequence, 3);
                decoded.message
            }
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    /// Builds a checksum-valid frame with an arbitrary type byte and payload.
    fn raw_frame(type_byte: u8, sequence: u32, payload: &[u8]) -> Vec<u8> {
        let length = (FRAME_HEADER_SIZE + payload.len()) as u32;
        let mut buf = length.to_be_bytes().to_vec();
        buf.push(type_byte);
        buf.extend_from_slice(&sequence.to_be_bytes());
        buf.extend_from_slice(payload);
        let crc = crc32fast::hash(&buf[LENGTH_PREFIX_SIZE..]);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf
    }

    // ── Round trips ───────────────────────────────────────────────────────────

    #[test]
    fn test_handshake_round_trip() {
        let msg = Message::Handshake(HandshakeMessage {
            role: PeerRole::Controlled,
            protocol_version: 1,
            client_id: Uuid::new_v4(),
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn test_handshake_ack_with_and_without_reason_round_trip() {
        let accepted = Message::HandshakeAck(HandshakeAckMessage::accepted());
        assert_eq!(round_trip(accepted.clone()), accepted);

        let rejected = Message::HandshakeAck(HandshakeAckMessage::rejected("version 2 != 1"));
        assert_eq!(round_trip(rejected.clone()), rejected);

        // An empty reason is distinct from no reason.
        let empty = Message::HandshakeAck(HandshakeAckMessage {
            status: HandshakeStatus::Rejected,
            reason: Some(String::new()),
        });
        assert_eq!(round_trip(empty.clone()), empty);
    }

    #[test]
    fn test_input_events_round_trip() {
        let events = [
            InputEvent::MouseMove { x: -1280, y: 40, dx: -3, dy: 7 },
            InputEvent::MouseButton {
                button: MouseButton::Forward,
                state: PressState::Released,
                x: 10,
                y: 20,
            },
            InputEvent::MouseScroll { dx: 0, dy: -120 },
            InputEvent::Key {
                key: KeyCode::ESCAPE,
                state: PressState::Pressed,
                modifiers: Modifiers(Modifiers::CTRL | Modifiers::SHIFT),
            },
        ];
        for event in events {
            assert_eq!(round_trip(Message::Input(event)), Message::Input(event));
        }
    }

    #[test]
    fn test_control_transfer_round_trip_keeps_optional_edge() {
        let to_remote = Message::ControlTransfer(ControlTransferMessage::to_remote(Edge::Bottom));
        assert_eq!(round_trip(to_remote.clone()), to_remote);
        let to_local = Message::ControlTransfer(ControlTransferMessage::to_local());
        assert_eq!(round_trip(to_local.clone()), to_local);
    }

    #[test]
    fn test_error_heartbeat_disconnect_round_trip() {
        let error = Message::Error(ErrorMessage {
            code: ErrorCode::UnknownMessageType,
            message: "type 0x99".to_string(),
        });
        assert_eq!(round_trip(error.clone()), error);

        let hb = Message::Heartbeat { timestamp_ms: u64::MAX };
        assert_eq!(round_trip(hb.clone()), hb);

        let bye = Message::Disconnect { reason: DisconnectReason::Timeout };
        assert_eq!(round_trip(bye.clone()), bye);
    }

    // ── Header layout ─────────────────────────────────────────────────────────

    #[test]
    fn test_header_layout_is_length_type_sequence() {
        // Arrange
        let frame = Frame {
            sequence: 0x0102_0304,
            message: Message::Heartbeat { timestamp_ms: 0 },
        };

        // Act
        let bytes = encode_frame(&frame).unwrap();

        // Assert – 8-byte payload, so length = 5 + 8 = 13
        assert_eq!(&bytes[0..4], &13u32.to_be_bytes());
        assert_eq!(bytes[4], MessageType::Heartbeat as u8);
        assert_eq!(&bytes[5..9], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes.len(), LENGTH_PREFIX_SIZE + 13 + CHECKSUM_SIZE);
    }

    #[test]
    fn test_checksum_covers_type_sequence_and_payload() {
        let bytes = encode_frame(&Frame {
            sequence: 9,
            message: Message::Disconnect { reason: DisconnectReason::Shutdown },
        })
        .unwrap();
        let body_end = bytes.len() - CHECKSUM_SIZE;
        let expected = crc32fast::hash(&bytes[LENGTH_PREFIX_SIZE..body_end]);
        assert_eq!(&bytes[body_end..], &expected.to_be_bytes());
    }

    // ── Partial input ─────────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_needs_more_data() {
        assert_eq!(decode_frame(&[]), Ok(Decoded::NeedMoreData));
    }

    #[test]
    fn test_decode_every_strict_prefix_needs_more_data() {
        let bytes = encode_frame(&Frame {
            sequence: 1,
            message: Message::Input(InputEvent::MouseScroll { dx: 1, dy: 2 }),
        })
        .unwrap();
        for cut in 0..bytes.len() {
            assert_eq!(
                decode_frame(&bytes[..cut]),
                Ok(Decoded::NeedMoreData),
                "prefix of {cut} bytes must not decode"
            );
        }
    }

    #[test]
    fn test_decode_reports_only_first_frame_when_two_are_buffered() {
        let a = encode_frame(&Frame { sequence: 0, message: Message::Heartbeat { timestamp_ms: 1 } }).unwrap();
        let b = encode_frame(&Frame { sequence: 1, message: Message::Heartbeat { timestamp_ms: 2 } }).unwrap();
        let mut both = a.clone();
        both.extend_from_slice(&b);

        match decode_frame(&both).unwrap() {
            Decoded::Frame { frame, consumed } => {
                assert_eq!(frame.sequence, 0);
                assert_eq!(consumed, a.len());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // ── Error conditions ──────────────────────────────────────────────────────

    #[test]
    fn test_decode_flipped_payload_byte_is_checksum_mismatch() {
        let mut bytes = encode_frame(&Frame {
            sequence: 5,
            message: Message::Input(InputEvent::MouseMove { x: 1, y: 2, dx: 3, dy: 4 }),
        })
        .unwrap();
        bytes[12] ^= 0x40;
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_length_below_header_is_corrupt() {
        let bytes = [0, 0, 0, 2, 0x03, 0, 0, 0, 0, 0, 0];
        assert!(matches!(decode_frame(&bytes), Err(ProtocolError::CorruptFrame(_))));
    }

    #[test]
    fn test_decode_oversized_length_is_corrupt_without_waiting_for_body() {
        let bytes = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(matches!(decode_frame(&bytes), Err(ProtocolError::CorruptFrame(_))));
    }

    #[test]
    fn test_decode_unknown_type_is_consumed_not_fatal() {
        // Arrange
        let bytes = raw_frame(0x99, 12, &[1, 2, 3]);

        // Act
        let decoded = decode_frame(&bytes).unwrap();

        // Assert
        assert_eq!(
            decoded,
            Decoded::UnknownType {
                type_byte: 0x99,
                sequence: 12,
                consumed: bytes.len()
            }
        );
    }

    #[test]
    fn test_decode_trailing_bytes_after_last_field_are_malformed() {
        // Arrange – a valid Disconnect payload plus two stray bytes
        let disconnect = raw_frame(MessageType::Disconnect as u8, 0, &[0x01, 0xAA, 0xBB]);
        let mut ack_payload = vec![0x01, 0x01, 0x00, 0x02];
        ack_payload.extend_from_slice(b"no");
        ack_payload.push(0x00);
        let ack = raw_frame(MessageType::HandshakeAck as u8, 0, &ack_payload);

        // Act / Assert
        for bytes in [disconnect, ack] {
            assert!(matches!(
                decode_frame(&bytes),
                Err(ProtocolError::MalformedPayload(_))
            ));
        }
    }

    #[test]
    fn test_screen_info_round_trip() {
        let info = Message::ScreenInfo(ScreenInfoMessage {
            width: 2560,
            height: 1440,
        });
        assert_eq!(round_trip(info.clone()), info);
    }

    #[test]
    fn test_decode_known_type_with_short_payload_is_malformed() {
        let bytes = raw_frame(MessageType::Handshake as u8, 0, &[0x02, 0x01]);
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_invalid_enum_value_is_malformed() {
        // Input kind 0x04 (key) with press state 0x07
        let bytes = raw_frame(MessageType::Input as u8, 0, &[0x04, 0x00, 0x29, 0x07, 0x00]);
        assert!(matches!(
            decode_frame(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_write_length_prefixed_string_truncates_on_char_boundary() {
        let s = "é".repeat(40_000); // 80_000 bytes
        let mut buf = Vec::new();
        write_length_prefixed_string(&mut buf, &s);
        let (decoded, _) = read_length_prefixed_string(&buf, 0).expect("valid UTF-8");
        assert!(decoded.len() <= u16::MAX as usize);
        assert!(decoded.chars().all(|c| c == 'é'));
    }

    // ── Stream codec ──────────────────────────────────────────────────────────

    #[test]
    fn test_frame_codec_resumes_across_partial_buffers() {
        // Arrange
        let frame = Frame {
            sequence: 77,
            message: Message::ControlTransfer(ControlTransferMessage::to_remote(Edge::Left)),
        };
        let bytes = encode_frame(&frame).unwrap();
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        // Act – feed one byte at a time
        let mut out = Vec::new();
        for b in &bytes {
            buf.extend_from_slice(&[*b]);
            if let Some(item) = codec.decode(&mut buf).expect("decode") {
                out.push(item);
            }
        }

        // Assert
        assert_eq!(out, vec![DecodedFrame::Frame(frame)]);
        assert!(buf.is_empty(), "a complete frame must be fully consumed");
    }

    #[test]
    fn test_frame_codec_skips_unknown_type_and_continues() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&raw_frame(0xEE, 0, &[]));
        let mut codec = FrameCodec::new();
        codec
            .encode(
                Frame {
                    sequence: 1,
                    message: Message::Heartbeat { timestamp_ms: 5 },
                },
                &mut buf,
            )
            .unwrap();

        let first = codec.decode(&mut buf).unwrap();
        let second = codec.decode(&mut buf).unwrap();

        assert_eq!(first, Some(DecodedFrame::UnknownType { type_byte: 0xEE, sequence: 0 }));
        assert!(matches!(second, Some(DecodedFrame::Frame(Frame { sequence: 1, .. }))));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
