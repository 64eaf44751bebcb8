//! Input capture capability for the controller.
//!
//! A platform adapter installs OS keyboard and mouse hooks on its own thread
//! and pushes every event into a tokio unbounded channel, so the hook callback
//! never blocks on the async runtime.  While the peer owns input the adapter
//! is switched to [`CaptureMode::Suppress`] and swallows events instead of
//! letting the local desktop see them.
//!
//! # Testability
//!
//! The [`InputSource`] trait lets tests and the headless binary inject
//! synthetic events through [`mock::MockInputSource`] without any OS hooks.

use mkshare_core::protocol::{
    InputEvent, KeyCode, Modifiers, MouseButton, PressState,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub mod mock;

/// A local input event as seen by the capture hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedInput {
    /// Absolute cursor position in virtual-desktop coordinates.
    MouseMove { x: i32, y: i32 },
    MouseButton {
        button: MouseButton,
        state: PressState,
        x: i32,
        y: i32,
    },
    MouseScroll { dx: i32, dy: i32 },
    Key {
        key: KeyCode,
        state: PressState,
        modifiers: Modifiers,
    },
}

impl CapturedInput {
    /// Converts to the wire form.  Mouse moves need an anchor to compute a
    /// delta and are handled by the router instead; for them this returns
    /// a zero-delta move.
    pub fn to_input_event(self) -> InputEvent {
        match self {
            CapturedInput::MouseMove { x, y } => InputEvent::MouseMove { x, y, dx: 0, dy: 0 },
            CapturedInput::MouseButton {
                button,
                state,
                x,
                y,
            } => InputEvent::MouseButton {
                button,
                state,
                x,
                y,
            },
            CapturedInput::MouseScroll { dx, dy } => InputEvent::MouseScroll { dx, dy },
            CapturedInput::Key {
                key,
                state,
                modifiers,
            } => InputEvent::Key {
                key,
                state,
                modifiers,
            },
        }
    }
}

/// Whether captured events also reach the local desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Events are observed and passed on to the OS.
    #[default]
    PassThrough,
    /// Events are observed and swallowed.
    Suppress,
}

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to install input hook: {0}")]
    HookInstallFailed(String),
    #[error("capture source is not running")]
    NotRunning,
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting the OS input hooks.
pub trait InputSource: Send + Sync {
    /// Installs the hooks and returns the event stream.
    fn start(&self) -> Result<UnboundedReceiver<CapturedInput>, CaptureError>;
    /// Removes the hooks; the stream ends.
    fn stop(&self);
    fn set_capture_mode(&self, mode: CaptureMode);
}
