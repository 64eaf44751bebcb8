//! Integration tests for the mkshare-core frame codec.
//!
//! Exercises the public codec API end to end: whole-stream decoding through
//! `FramedRead` under arbitrary chunking, and corruption detection across
//! every byte the checksum covers.

use futures_util::StreamExt;
use mkshare_core::protocol::{
    decode_frame, encode_frame, ControlTransferMessage, DecodedFrame, DisconnectReason,
    ErrorCode, ErrorMessage, Frame, FrameCodec, HandshakeAckMessage, HandshakeMessage,
    InputEvent, KeyCode, Message, Modifiers, MouseButton, PeerRole, PressState, ProtocolError,
    ScreenInfoMessage, PROTOCOL_VERSION,
};
use mkshare_core::Edge;
use tokio_util::codec::FramedRead;
use uuid::Uuid;

/// One frame of every message type, numbered from 0.
fn sample_frames() -> Vec<Frame> {
    let messages = vec![
        Message::Handshake(HandshakeMessage {
            role: PeerRole::Controlled,
            protocol_version: PROTOCOL_VERSION,
            client_id: Uuid::new_v4(),
        }),
        Message::HandshakeAck(HandshakeAckMessage::accepted()),
        Message::HandshakeAck(HandshakeAckMessage::rejected("version mismatch")),
        Message::Heartbeat {
            timestamp_ms: 1_700_000_000_123,
        },
        Message::ScreenInfo(ScreenInfoMessage {
            width: 1920,
            height: 1080,
        }),
        Message::ControlTransfer(ControlTransferMessage::to_remote(Edge::Right)),
        Message::Input(InputEvent::MouseMove {
            x: 1917,
            y: 540,
            dx: 3,
            dy: -1,
        }),
        Message::Input(InputEvent::MouseButton {
            button: MouseButton::Left,
            state: PressState::Pressed,
            x: 10,
            y: 20,
        }),
        Message::Input(InputEvent::MouseScroll { dx: 0, dy: -3 }),
        Message::Input(InputEvent::Key {
            key: KeyCode::A,
            state: PressState::Released,
            modifiers: Modifiers(Modifiers::SHIFT | Modifiers::CTRL),
        }),
        Message::ControlTransfer(ControlTransferMessage::to_local()),
        Message::Error(ErrorMessage {
            code: ErrorCode::UnknownMessageType,
            message: "unknown message type 0x7E".to_string(),
        }),
        Message::Disconnect {
            reason: DisconnectReason::Shutdown,
        },
    ];
    messages
        .into_iter()
        .enumerate()
        .map(|(i, message)| Frame {
            sequence: i as u32,
            message,
        })
        .collect()
}

fn encode_all(frames: &[Frame]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|f| encode_frame(f).expect("encode must succeed"))
        .collect()
}

/// Feeds `stream` through `FramedRead` in chunks of `chunk` bytes.
async fn decode_chunked(stream: &[u8], chunk: usize) -> Vec<Frame> {
    let mut builder = tokio_test::io::Builder::new();
    for piece in stream.chunks(chunk) {
        builder.read(piece);
    }
    let mut reader = FramedRead::new(builder.build(), FrameCodec::new());

    let mut out = Vec::new();
    while let Some(item) = reader.next().await {
        match item.expect("stream must decode") {
            DecodedFrame::Frame(frame) => out.push(frame),
            other => panic!("unexpected item {other:?}"),
        }
    }
    out
}

#[test]
fn test_every_message_type_round_trips() {
    for frame in sample_frames() {
        let bytes = encode_frame(&frame).unwrap();
        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(
            decoded,
            mkshare_core::protocol::Decoded::Frame {
                frame: frame.clone(),
                consumed: bytes.len()
            }
        );
    }
}

#[tokio::test]
async fn test_any_chunking_yields_the_same_frames() {
    // Arrange
    let frames = sample_frames();
    let stream = encode_all(&frames);

    // Act / Assert – byte-at-a-time, odd sizes, and one whole buffer
    for chunk in [1, 2, 3, 7, 13, 64, stream.len()] {
        let decoded = decode_chunked(&stream, chunk).await;
        assert_eq!(decoded, frames, "chunk size {chunk}");
    }
}

#[test]
fn test_single_byte_corruption_in_checksum_region_is_detected() {
    // Arrange
    let frame = Frame {
        sequence: 0xDEAD_BEEF,
        message: Message::Input(InputEvent::Key {
            key: KeyCode::ESCAPE,
            state: PressState::Pressed,
            modifiers: Modifiers(Modifiers::ALT),
        }),
    };
    let bytes = encode_frame(&frame).unwrap();

    // Act / Assert – every byte after the length prefix, every bit
    for index in 4..bytes.len() {
        for bit in 0..8 {
            let mut corrupted = bytes.clone();
            corrupted[index] ^= 1 << bit;
            let result = decode_frame(&corrupted);
            assert!(
                matches!(result, Err(ProtocolError::ChecksumMismatch { .. })),
                "byte {index} bit {bit}: {result:?}"
            );
        }
    }
}

#[test]
fn test_corrupt_length_prefix_is_rejected_not_trusted() {
    let mut bytes = encode_frame(&Frame {
        sequence: 1,
        message: Message::Heartbeat { timestamp_ms: 9 },
    })
    .unwrap();
    bytes[0] = 0xFF;

    assert!(matches!(
        decode_frame(&bytes),
        Err(ProtocolError::CorruptFrame(_))
    ));
}
