//! Wire protocol: message types, the framed CRC codec, and sequence numbering.

pub mod codec;
pub mod keys;
pub mod messages;
pub mod sequence;

pub use codec::{
    decode_frame, encode_frame, CodecError, Decoded, DecodedFrame, Frame, FrameCodec,
    ProtocolError, MAX_FRAME_LEN,
};
pub use keys::{KeyCode, Modifiers};
pub use messages::*;
pub use sequence::{is_newer, SequenceCheck, SequenceCounter, SequenceTracker};
