//! Criterion benchmarks for the MKShare frame codec.
//!
//! Input frames dominate traffic while the peer owns input, so the hot path
//! is encoding and decoding single `Input` frames.  A 20-frame stream is also
//! decoded through the resumable `FrameCodec` to cover buffer handling.
//!
//! Run with:
//! ```bash
//! cargo bench --package mkshare-core --bench codec_bench
//! ```

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mkshare_core::protocol::{
    decode_frame, encode_frame, ControlTransferMessage, Frame, FrameCodec, HandshakeMessage,
    InputEvent, KeyCode, Message, Modifiers, PeerRole, PressState, PROTOCOL_VERSION,
};
use mkshare_core::Edge;
use tokio_util::codec::Decoder;
use uuid::Uuid;

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn mouse_move() -> Message {
    Message::Input(InputEvent::MouseMove {
        x: 960,
        y: 540,
        dx: 10,
        dy: -5,
    })
}

fn key_down() -> Message {
    Message::Input(InputEvent::Key {
        key: KeyCode::A,
        state: PressState::Pressed,
        modifiers: Modifiers(Modifiers::SHIFT),
    })
}

fn fixtures() -> Vec<(&'static str, Message)> {
    vec![
        ("MouseMove", mouse_move()),
        ("Key", key_down()),
        ("Heartbeat", Message::Heartbeat { timestamp_ms: 1_700_000_000_000 }),
        (
            "ControlTransfer",
            Message::ControlTransfer(ControlTransferMessage::to_remote(Edge::Right)),
        ),
        (
            "Handshake",
            Message::Handshake(HandshakeMessage {
                role: PeerRole::Controlled,
                protocol_version: PROTOCOL_VERSION,
                client_id: Uuid::new_v4(),
            }),
        ),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, message) in fixtures() {
        let frame = Frame {
            sequence: 7,
            message,
        };
        group.bench_with_input(BenchmarkId::new("msg", name), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for (name, message) in fixtures() {
        let bytes = encode_frame(&Frame {
            sequence: 7,
            message,
        })
        .unwrap();
        group.bench_with_input(BenchmarkId::new("msg", name), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_stream_decode(c: &mut Criterion) {
    let stream: Vec<u8> = (0..20u32)
        .flat_map(|sequence| {
            let message = if sequence % 2 == 0 { mouse_move() } else { key_down() };
            encode_frame(&Frame { sequence, message }).unwrap()
        })
        .collect();

    c.bench_function("frame_codec_stream_20", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::from(black_box(stream.as_slice()));
            let mut count = 0;
            while let Some(_frame) = codec.decode(&mut buf).unwrap() {
                count += 1;
            }
            count
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_stream_decode);
criterion_main!(benches);
