//! Framed link halves.
//!
//! A link is one byte stream split into a reading half and a writing half.
//! The writer is shared by every task that needs to talk to the peer (the
//! heartbeat loop, the event router, shutdown), so it sits behind a mutex that
//! covers both sequence assignment and the write itself.  Frames therefore hit
//! the wire whole and in sequence order.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{trace, warn};

use crate::protocol::codec::{DecodedFrame, Frame, FrameCodec};
use crate::protocol::messages::Message;
use crate::protocol::sequence::{SequenceCheck, SequenceCounter, SequenceTracker};
use crate::transport::error::SessionError;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Splits `stream` into framed halves.  Sequence numbering starts at 0 on
/// both halves.
pub fn split_link<S>(stream: S) -> (LinkReader, LinkWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (
        LinkReader::new(Box::new(read_half)),
        LinkWriter::new(Box::new(write_half)),
    )
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// One item read from the link.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message { sequence: u32, message: Message },
    /// A well-formed frame of a type this build does not know.
    Unknown { type_byte: u8, sequence: u32 },
}

/// Reading half of a link.  Drops duplicate and reordered frames.
pub struct LinkReader {
    frames: FramedRead<BoxedRead, FrameCodec>,
    tracker: SequenceTracker,
}

impl LinkReader {
    fn new(read: BoxedRead) -> Self {
        Self {
            frames: FramedRead::new(read, FrameCodec::new()),
            tracker: SequenceTracker::new(),
        }
    }

    /// Reads the next accepted frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream.  Cancel-safe: a frame is
    /// either returned whole or left in the buffer.
    ///
    /// # Errors
    ///
    /// Any [`SessionError::Protocol`] or [`SessionError::Transport`] is fatal
    /// to the link.
    pub async fn next_frame(&mut self) -> Result<Option<Inbound>, SessionError> {
        loop {
            let Some(item) = self.frames.next().await else {
                return Ok(None);
            };
            let inbound = match item? {
                DecodedFrame::Frame(Frame { sequence, message }) => {
                    Inbound::Message { sequence, message }
                }
                DecodedFrame::UnknownType {
                    type_byte,
                    sequence,
                } => Inbound::Unknown {
                    type_byte,
                    sequence,
                },
            };
            let sequence = match &inbound {
                Inbound::Message { sequence, .. } | Inbound::Unknown { sequence, .. } => *sequence,
            };

            match self.tracker.observe(sequence) {
                SequenceCheck::InOrder => {}
                SequenceCheck::Gap { expected } => {
                    warn!(expected, got = sequence, "sequence gap on link");
                }
                SequenceCheck::Stale { last } => {
                    warn!(last, got = sequence, "dropping stale frame");
                    continue;
                }
            }
            trace!(sequence, "frame received");
            return Ok(Some(inbound));
        }
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writing half of a link.  Cheap to clone; all clones share one stream and
/// one sequence counter.
#[derive(Clone)]
pub struct LinkWriter {
    sink: Arc<Mutex<FramedWrite<BoxedWrite, FrameCodec>>>,
    sequence: Arc<SequenceCounter>,
}

impl LinkWriter {
    fn new(write: BoxedWrite) -> Self {
        Self {
            sink: Arc::new(Mutex::new(FramedWrite::new(write, FrameCodec::new()))),
            sequence: Arc::new(SequenceCounter::new()),
        }
    }

    /// Sends `message` and returns the sequence number it was given.
    pub async fn send(&self, message: Message) -> Result<u32, SessionError> {
        let mut sink = self.sink.lock().await;
        let sequence = self.sequence.next();
        sink.send(Frame { sequence, message }).await?;
        Ok(sequence)
    }

    /// Sequence number the next [`send`](Self::send) will use.
    pub fn next_sequence(&self) -> u32 {
        self.sequence.current()
    }

    /// Flushes and shuts down the write side of the stream.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut sink = self.sink.lock().await;
        SinkExt::<Frame>::close(&mut *sink).await?;
        Ok(())
    }
}

impl std::fmt::Debug for LinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkWriter")
            .field("next_sequence", &self.next_sequence())
            .finish()
    }
}
