//! Mock input source for tests and headless runs.
//!
//! Lets callers inject synthetic [`CapturedInput`]s and records every
//! capture-mode switch the router makes.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{CaptureError, CaptureMode, CapturedInput, InputSource};

/// An [`InputSource`] driven by [`inject_event`](Self::inject_event).
#[derive(Default)]
pub struct MockInputSource {
    sender: Mutex<Option<UnboundedSender<CapturedInput>>>,
    modes: Mutex<Vec<CaptureMode>>,
}

impl MockInputSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a synthetic event, as if captured from hardware.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NotRunning`] before `start()` or after `stop()`.
    pub fn inject_event(&self, event: CapturedInput) -> Result<(), CaptureError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(event).map_err(|_| CaptureError::NotRunning),
            None => Err(CaptureError::NotRunning),
        }
    }

    /// The most recent mode set by the router.
    pub fn capture_mode(&self) -> CaptureMode {
        self.mode_history().last().copied().unwrap_or_default()
    }

    /// Every mode switch, in order.
    pub fn mode_history(&self) -> Vec<CaptureMode> {
        self.modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<UnboundedReceiver<CapturedInput>, CaptureError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn set_capture_mode(&self, mode: CaptureMode) {
        self.modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mode);
    }
}
