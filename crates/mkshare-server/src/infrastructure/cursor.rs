//! Cursor adapter used by headless runs and tests.
//!
//! Real builds would back [`CursorController`] with the platform's
//! `SetCursorPos`/`CGWarpMouseCursorPosition`/XWarpPointer calls.  The
//! [`RecordingCursor`] keeps a virtual position instead and records every
//! teleport so tests can assert on warps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::application::route_input::CursorController;

/// A virtual cursor.
#[derive(Debug, Default)]
pub struct RecordingCursor {
    position: Mutex<(i32, i32)>,
    teleports: Mutex<Vec<(i32, i32)>>,
    pinned: AtomicBool,
}

impl RecordingCursor {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            position: Mutex::new((x, y)),
            ..Self::default()
        }
    }

    /// Moves the virtual cursor, as if the user had moved the mouse.
    pub fn set_position(&self, x: i32, y: i32) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = (x, y);
    }

    /// While pinned, teleports are recorded but do not move the cursor.
    pub fn pin(&self, pinned: bool) {
        self.pinned.store(pinned, Ordering::SeqCst);
    }

    /// Every teleport requested so far, in order.
    pub fn teleports(&self) -> Vec<(i32, i32)> {
        self.teleports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CursorController for RecordingCursor {
    fn teleport_cursor(&self, x: i32, y: i32) {
        self.teleports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((x, y));
        if !self.pinned.load(Ordering::SeqCst) {
            self.set_position(x, y);
        }
    }

    fn cursor_position(&self) -> (i32, i32) {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
