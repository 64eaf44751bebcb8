//! Per-session sequence numbering.
//!
//! Every frame carries a 32-bit sequence number assigned by the sender.
//! Numbers start at 0 for each connection and increase by one per frame, so
//! a receiver can tell a duplicate or reordered frame from a fresh one.
//!
//! - [`SequenceCounter`] hands out outbound numbers.
//! - [`SequenceTracker`] classifies inbound numbers.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing counter for outbound frames.
///
/// Wraps from `u32::MAX` back to 0 without panicking.  At one frame per
/// millisecond that takes roughly 50 days of uninterrupted session.
///
/// # Examples
///
/// ```rust
/// use mkshare_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.current(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    /// Creates a new counter starting at 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next sequence number and advances the counter.
    ///
    /// `Relaxed` is enough: the number orders frames, it does not publish
    /// other memory.
    pub fn next(&self) -> u32 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the number the next call to [`next`](Self::next) will hand out.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serial-number comparison: `true` if `sequence` comes after `last`.
///
/// Anything up to half the number space behind `last` counts as old, so the
/// ordering survives the wrap at `u32::MAX`.
pub fn is_newer(sequence: u32, last: u32) -> bool {
    sequence.wrapping_sub(last) as i32 > 0
}

/// Classification of an inbound sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly the next expected number.
    InOrder,
    /// Newer than expected; `expected` frames were skipped.  The frame is
    /// still applied.
    Gap { expected: u32 },
    /// At or below the last accepted number (duplicate or reordered).
    /// The frame must be discarded.
    Stale { last: u32 },
}

impl SequenceCheck {
    /// Returns `true` if the frame should be applied.
    pub fn is_accepted(self) -> bool {
        !matches!(self, SequenceCheck::Stale { .. })
    }
}

/// Tracks the highest sequence number accepted on one connection.
///
/// Create a fresh tracker per connection; numbering restarts at 0 after a
/// reconnect.
#[derive(Debug, Default, Clone)]
pub struct SequenceTracker {
    last: Option<u32>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `sequence` and, if accepted, records it as the new high
    /// water mark.
    pub fn observe(&mut self, sequence: u32) -> SequenceCheck {
        let check = match self.last {
            None if sequence == 0 => SequenceCheck::InOrder,
            None => SequenceCheck::Gap { expected: 0 },
            Some(last) if !is_newer(sequence, last) => SequenceCheck::Stale { last },
            Some(last) if sequence == last.wrapping_add(1) => SequenceCheck::InOrder,
            Some(last) => SequenceCheck::Gap {
                expected: last.wrapping_add(1),
            },
        };
        if check.is_accepted() {
            self.last = Some(sequence);
        }
        check
    }

    /// Highest accepted sequence number so far.
    pub fn last(&self) -> Option<u32> {
        self.last
    }
}
