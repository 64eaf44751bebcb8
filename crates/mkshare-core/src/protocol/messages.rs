//! All MKShare protocol message types.
//!
//! A [`Message`] is the unit exchanged between the controller (the machine
//! whose keyboard and mouse are physically attached) and the controlled peer.
//! Framing, sequence numbers, and checksums are added by the codec; this
//! module only describes the typed payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::geometry::{DisplayBounds, Edge};
use crate::protocol::keys::{KeyCode, Modifiers};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version.  Peers must match exactly.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Historical default TCP port.
pub const DEFAULT_PORT: u16 = 41234;

// ── Message type codes ────────────────────────────────────────────────────────

/// Type byte written in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Session control (0x01–0x0F)
    Handshake = 0x01,
    HandshakeAck = 0x02,
    Heartbeat = 0x03,
    Disconnect = 0x05,
    ScreenInfo = 0x06,
    // Input (0x10–0x2F)
    Input = 0x10,
    // Ownership (0x30–0x3F)
    ControlTransfer = 0x30,
    // Faults (0x70–0x7F)
    Error = 0x70,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Handshake),
            0x02 => Ok(MessageType::HandshakeAck),
            0x03 => Ok(MessageType::Heartbeat),
            0x05 => Ok(MessageType::Disconnect),
            0x06 => Ok(MessageType::ScreenInfo),
            0x10 => Ok(MessageType::Input),
            0x30 => Ok(MessageType::ControlTransfer),
            0x70 => Ok(MessageType::Error),
            _ => Err(()),
        }
    }
}

// ── Session control payloads ──────────────────────────────────────────────────

/// Which side of the link a peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PeerRole {
    /// Owns the physical input devices and listens for a peer.
    Controller = 0x01,
    /// Receives injected input and dials the controller.
    Controlled = 0x02,
}

impl TryFrom<u8> for PeerRole {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(PeerRole::Controller),
            0x02 => Ok(PeerRole::Controlled),
            _ => Err(()),
        }
    }
}

/// HANDSHAKE (0x01): sent by the dialing peer immediately after connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub role: PeerRole,
    pub protocol_version: u8,
    /// Stable identifier of the dialing instance.
    pub client_id: Uuid,
}

/// Outcome carried in a [`HandshakeAckMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum HandshakeStatus {
    Accepted = 0x00,
    Rejected = 0x01,
}

/// HANDSHAKE_ACK (0x02): reply to a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAckMessage {
    pub status: HandshakeStatus,
    /// Human-readable rejection reason; `None` when accepted.
    pub reason: Option<String>,
}

impl HandshakeAckMessage {
    pub fn accepted() -> Self {
        Self {
            status: HandshakeStatus::Accepted,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: HandshakeStatus::Rejected,
            reason: Some(reason.into()),
        }
    }
}

/// Reason code carried by DISCONNECT (0x05).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DisconnectReason {
    /// The sender is shutting down.
    Shutdown = 0x01,
    /// The sender stopped hearing from us.
    Timeout = 0x02,
    /// The sender hit a protocol fault it cannot recover from.
    ProtocolError = 0x03,
}

impl TryFrom<u8> for DisconnectReason {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(DisconnectReason::Shutdown),
            0x02 => Ok(DisconnectReason::Timeout),
            0x03 => Ok(DisconnectReason::ProtocolError),
            _ => Err(()),
        }
    }
}

// ── Input payloads ────────────────────────────────────────────────────────────

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 0x01,
    Right = 0x02,
    Middle = 0x03,
    Back = 0x04,
    Forward = 0x05,
}

impl TryFrom<u8> for MouseButton {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MouseButton::Left),
            0x02 => Ok(MouseButton::Right),
            0x03 => Ok(MouseButton::Middle),
            0x04 => Ok(MouseButton::Back),
            0x05 => Ok(MouseButton::Forward),
            _ => Err(()),
        }
    }
}

/// Press/release state shared by buttons and keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PressState {
    Released = 0x00,
    Pressed = 0x01,
}

impl TryFrom<u8> for PressState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(PressState::Released),
            0x01 => Ok(PressState::Pressed),
            _ => Err(()),
        }
    }
}

/// Discriminant written as the first payload byte of an INPUT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InputKind {
    MouseMove = 0x01,
    MouseButton = 0x02,
    MouseScroll = 0x03,
    Key = 0x04,
}

impl TryFrom<u8> for InputKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(InputKind::MouseMove),
            0x02 => Ok(InputKind::MouseButton),
            0x03 => Ok(InputKind::MouseScroll),
            0x04 => Ok(InputKind::Key),
            _ => Err(()),
        }
    }
}

/// A single normalised input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Pointer motion: absolute controller position plus relative delta.
    MouseMove { x: i32, y: i32, dx: i32, dy: i32 },
    MouseButton {
        button: MouseButton,
        state: PressState,
        x: i32,
        y: i32,
    },
    /// Wheel motion; positive `dy` scrolls away from the user.
    MouseScroll { dx: i32, dy: i32 },
    Key {
        key: KeyCode,
        state: PressState,
        modifiers: Modifiers,
    },
}

impl InputEvent {
    pub fn kind(&self) -> InputKind {
        match self {
            InputEvent::MouseMove { .. } => InputKind::MouseMove,
            InputEvent::MouseButton { .. } => InputKind::MouseButton,
            InputEvent::MouseScroll { .. } => InputKind::MouseScroll,
            InputEvent::Key { .. } => InputKind::Key,
        }
    }
}

// ── Ownership payloads ────────────────────────────────────────────────────────

/// Direction of an ownership change, seen from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferDirection {
    /// Input now belongs to the controlled peer.
    ToRemote = 0x01,
    /// Input returns to the controller.
    ToLocal = 0x02,
}

impl TryFrom<u8> for TransferDirection {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(TransferDirection::ToRemote),
            0x02 => Ok(TransferDirection::ToLocal),
            _ => Err(()),
        }
    }
}

/// CONTROL_TRANSFER (0x30): ownership change notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlTransferMessage {
    pub direction: TransferDirection,
    /// Controller edge that was crossed.  Always set for `ToRemote`;
    /// `None` for a keyboard recall.
    pub edge: Option<Edge>,
}

impl ControlTransferMessage {
    pub fn to_remote(edge: Edge) -> Self {
        Self {
            direction: TransferDirection::ToRemote,
            edge: Some(edge),
        }
    }

    pub fn to_local() -> Self {
        Self {
            direction: TransferDirection::ToLocal,
            edge: None,
        }
    }
}

// ── Peer description ──────────────────────────────────────────────────────────

/// SCREEN_INFO (0x06): size of the sender's primary display.
///
/// The controlled peer sends one right after its handshake is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenInfoMessage {
    pub width: u32,
    pub height: u32,
}

impl From<&DisplayBounds> for ScreenInfoMessage {
    fn from(display: &DisplayBounds) -> Self {
        Self {
            width: display.width,
            height: display.height,
        }
    }
}

// ── Error payload ─────────────────────────────────────────────────────────────

/// Fault codes reported in ERROR (0x70).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    VersionMismatch = 0x01,
    UnknownMessageType = 0x02,
    /// A message arrived that is not valid in the current session phase.
    UnexpectedMessage = 0x03,
    /// The controller already serves a peer.
    Busy = 0x04,
    Internal = 0x7F,
}

impl From<u8> for ErrorCode {
    /// Unknown codes degrade to [`ErrorCode::Internal`] so a newer peer's
    /// error report is still delivered.
    fn from(value: u8) -> Self {
        match value {
            0x01 => ErrorCode::VersionMismatch,
            0x02 => ErrorCode::UnknownMessageType,
            0x03 => ErrorCode::UnexpectedMessage,
            0x04 => ErrorCode::Busy,
            _ => ErrorCode::Internal,
        }
    }
}

/// ERROR (0x70): protocol-level fault report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Handshake(HandshakeMessage),
    HandshakeAck(HandshakeAckMessage),
    /// Liveness signal; `timestamp_ms` is the sender's wall clock and carries
    /// no semantics beyond diagnostics.
    Heartbeat { timestamp_ms: u64 },
    Disconnect { reason: DisconnectReason },
    ScreenInfo(ScreenInfoMessage),
    Input(InputEvent),
    ControlTransfer(ControlTransferMessage),
    Error(ErrorMessage),
}

impl Message {
    /// Returns the wire type code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Handshake(_) => MessageType::Handshake,
            Message::HandshakeAck(_) => MessageType::HandshakeAck,
            Message::Heartbeat { .. } => MessageType::Heartbeat,
            Message::Disconnect { .. } => MessageType::Disconnect,
            Message::ScreenInfo(_) => MessageType::ScreenInfo,
            Message::Input(_) => MessageType::Input,
            Message::ControlTransfer(_) => MessageType::ControlTransfer,
            Message::Error(_) => MessageType::Error,
        }
    }
}
