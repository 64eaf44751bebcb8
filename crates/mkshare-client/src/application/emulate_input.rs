//! EmulateInputUseCase: replays the controller's input on this machine.
//!
//! This use case sits at the application layer and delegates to a
//! [`PlatformInputEmulator`] trait object for OS-level event injection.
//! The platform-specific implementations are in the infrastructure layer.
//!
//! # Modes
//!
//! ```text
//!        ControlTransfer{ToRemote, edge}
//!   Idle ───────────────────────────────▶ Injecting
//!    ▲                                        │
//!    └──── ControlTransfer{ToLocal} ──────────┘
//!          or link lost (held input released)
//! ```
//!
//! Inbound `Input` is only injected while `Injecting`.
//!
//! # Ordering
//!
//! Every frame is keyed by `(link_epoch, sequence)`.  The epoch grows with
//! each new connection, so a frame from an earlier link that is still queued
//! after a reconnect compares below the watermark and is dropped.  Within
//! one epoch sequences compare as serial numbers, so a link that outlives
//! the `u32` wrap keeps delivering.

use std::sync::Arc;

use mkshare_core::protocol::{
    is_newer, ControlTransferMessage, InputEvent, KeyCode, Message, Modifiers, MouseButton,
    PressState, TransferDirection,
};
use mkshare_core::ScreenGeometry;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Error type for input emulation operations.
#[derive(Debug, Error)]
pub enum EmulationError {
    #[error("platform error: {0}")]
    Platform(String),
}

/// Platform-agnostic input emulation trait.
///
/// Each supported OS provides an implementation in the infrastructure layer.
pub trait PlatformInputEmulator: Send + Sync {
    /// Emulates a key press or release.
    fn emit_key(
        &self,
        key: KeyCode,
        state: PressState,
        modifiers: Modifiers,
    ) -> Result<(), EmulationError>;

    /// Emulates a mouse button press or release at the current position.
    fn emit_mouse_button(&self, button: MouseButton, state: PressState)
        -> Result<(), EmulationError>;

    /// Emulates mouse wheel scroll.
    fn emit_scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError>;

    /// Moves the cursor by a relative offset.
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError>;

    /// Moves the cursor to an absolute position in local desktop coordinates.
    fn move_absolute(&self, x: i32, y: i32) -> Result<(), EmulationError>;
}

/// Whether inbound input is currently being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmulationMode {
    #[default]
    Idle,
    Injecting,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Injected, or a mode switch was applied.
    Applied,
    /// At or below the `(epoch, sequence)` watermark.
    Stale,
    /// Valid, but nothing to do (e.g. input while idle).
    Ignored,
}

/// The Emulate Input use case.
pub struct EmulateInputUseCase {
    emulator: Arc<dyn PlatformInputEmulator>,
    geometry: ScreenGeometry,
    mode: EmulationMode,
    watermark: Option<(u64, u32)>,
    held_keys: Vec<(KeyCode, Modifiers)>,
    held_buttons: Vec<MouseButton>,
}

impl EmulateInputUseCase {
    pub fn new(emulator: Arc<dyn PlatformInputEmulator>, geometry: ScreenGeometry) -> Self {
        Self {
            emulator,
            geometry,
            mode: EmulationMode::Idle,
            watermark: None,
            held_keys: Vec::new(),
            held_buttons: Vec::new(),
        }
    }

    pub fn mode(&self) -> EmulationMode {
        self.mode
    }

    /// Highest `(epoch, sequence)` accepted so far.
    pub fn watermark(&self) -> Option<(u64, u32)> {
        self.watermark
    }

    /// Number of keys and buttons currently held down on this machine.
    pub fn held_count(&self) -> usize {
        self.held_keys.len() + self.held_buttons.len()
    }

    /// Applies one inbound frame from link `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError`] if the OS event injection fails.  The
    /// watermark has already advanced, so a failed frame is not retried.
    pub fn handle(
        &mut self,
        epoch: u64,
        sequence: u32,
        message: &Message,
    ) -> Result<Disposition, EmulationError> {
        let key = (epoch, sequence);
        let stale = self.watermark.is_some_and(|(mark_epoch, mark_sequence)| {
            epoch < mark_epoch || (epoch == mark_epoch && !is_newer(sequence, mark_sequence))
        });
        if stale {
            debug!(epoch, sequence, watermark = ?self.watermark, "dropping stale frame");
            return Ok(Disposition::Stale);
        }
        self.watermark = Some(key);

        match message {
            Message::ControlTransfer(transfer) => self.apply_transfer(transfer),
            Message::Input(event) => self.inject(event),
            other => {
                debug!(kind = ?other.message_type(), "no emulation for message");
                Ok(Disposition::Ignored)
            }
        }
    }

    /// The link dropped: whatever was held is released and injection stops.
    ///
    /// # Errors
    ///
    /// Returns the first [`EmulationError`] hit while releasing; every
    /// release is still attempted.
    pub fn on_link_lost(&mut self) -> Result<(), EmulationError> {
        let released = self.release_held();
        if self.mode == EmulationMode::Injecting {
            info!("link lost while injecting; control is back with this machine");
        }
        self.mode = EmulationMode::Idle;
        released
    }

    fn apply_transfer(
        &mut self,
        transfer: &ControlTransferMessage,
    ) -> Result<Disposition, EmulationError> {
        match transfer.direction {
            TransferDirection::ToRemote => {
                self.mode = EmulationMode::Injecting;
                match transfer.edge {
                    Some(edge) => {
                        let (x, y) = self.geometry.entry_point(edge.opposite());
                        info!(?edge, x, y, "control received; injecting input");
                        self.emulator.move_absolute(x, y)?;
                    }
                    None => warn!("control received without an edge; cursor left in place"),
                }
            }
            TransferDirection::ToLocal => {
                info!("control returned to controller");
                self.mode = EmulationMode::Idle;
                self.release_held()?;
            }
        }
        Ok(Disposition::Applied)
    }

    fn inject(&mut self, event: &InputEvent) -> Result<Disposition, EmulationError> {
        if self.mode == EmulationMode::Idle {
            debug!(kind = ?event.kind(), "input while idle; dropped");
            return Ok(Disposition::Ignored);
        }

        match *event {
            InputEvent::MouseMove { dx, dy, .. } => self.emulator.move_relative(dx, dy)?,
            InputEvent::MouseButton { button, state, .. } => {
                self.emulator.emit_mouse_button(button, state)?;
                match state {
                    PressState::Pressed if !self.held_buttons.contains(&button) => {
                        self.held_buttons.push(button)
                    }
                    PressState::Released => self.held_buttons.retain(|b| *b != button),
                    PressState::Pressed => {}
                }
            }
            InputEvent::MouseScroll { dx, dy } => self.emulator.emit_scroll(dx, dy)?,
            InputEvent::Key {
                key,
                state,
                modifiers,
            } => {
                self.emulator.emit_key(key, state, modifiers)?;
                match state {
                    PressState::Pressed if !self.held_keys.iter().any(|(k, _)| *k == key) => {
                        self.held_keys.push((key, modifiers))
                    }
                    PressState::Released => self.held_keys.retain(|(k, _)| *k != key),
                    PressState::Pressed => {}
                }
            }
        }
        Ok(Disposition::Applied)
    }

    /// Releases held keys (most recent first) and then buttons.
    fn release_held(&mut self) -> Result<(), EmulationError> {
        let mut first_error = None;

        for (key, modifiers) in self.held_keys.drain(..).rev() {
            debug!(?key, "releasing held key");
            if let Err(e) = self.emulator.emit_key(key, PressState::Released, modifiers) {
                first_error.get_or_insert(e);
            }
        }
        for button in self.held_buttons.drain(..) {
            debug!(?button, "releasing held button");
            if let Err(e) = self.emulator.emit_mouse_button(button, PressState::Released) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

// ── Link event pump ───────────────────────────────────────────────────────────

/// What the connection task reports to the emulation loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A handshake succeeded; frames from `epoch` follow.
    Connected { epoch: u64 },
    Message {
        epoch: u64,
        sequence: u32,
        message: Message,
    },
    /// The link for `epoch` is gone.
    Lost { epoch: u64 },
}

/// Applies link events in arrival order until the channel closes or
/// `cancel` fires, then hands the use case back.
///
/// Held input is released on the way out.
pub async fn run_emulation(
    mut use_case: EmulateInputUseCase,
    mut events: mpsc::Receiver<LinkEvent>,
    cancel: CancellationToken,
) -> EmulateInputUseCase {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            LinkEvent::Connected { epoch } => debug!(epoch, "link up"),
            LinkEvent::Message {
                epoch,
                sequence,
                message,
            } => {
                if let Err(e) = use_case.handle(epoch, sequence, &message) {
                    error!(epoch, sequence, error = %e, "input emulation failed");
                }
            }
            LinkEvent::Lost { epoch } => {
                debug!(epoch, "link down");
                if let Err(e) = use_case.on_link_lost() {
                    error!(error = %e, "failed to release held input");
                }
            }
        }
    }

    if let Err(e) = use_case.on_link_lost() {
        error!(error = %e, "failed to release held input on shutdown");
    }
    use_case
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::input_emulation::mock::{EmittedInput, MockInputEmulator};
    use mkshare_core::Edge;

    fn use_case() -> (Arc<MockInputEmulator>, EmulateInputUseCase) {
        let emulator = Arc::new(MockInputEmulator::new());
        let uc = EmulateInputUseCase::new(emulator.clone(), ScreenGeometry::single(1920, 1080));
        (emulator, uc)
    }

    fn to_remote(edge: Edge) -> Message {
        Message::ControlTransfer(ControlTransferMessage::to_remote(edge))
    }

    fn to_local() -> Message {
        Message::ControlTransfer(ControlTransferMessage::to_local())
    }

    fn key(k: KeyCode, state: PressState) -> Message {
        Message::Input(InputEvent::Key {
            key: k,
            state,
            modifiers: Modifiers::default(),
        })
    }

    // ── Mode switching ────────────────────────────────────────────────────────

    #[test]
    fn test_input_while_idle_is_ignored() {
        // Arrange
        let (emulator, mut uc) = use_case();

        // Act
        let d = uc.handle(1, 0, &key(KeyCode::A, PressState::Pressed)).unwrap();

        // Assert
        assert_eq!(d, Disposition::Ignored);
        assert!(emulator.emitted().is_empty());
    }

    #[test]
    fn test_to_remote_warps_to_opposite_entry_edge() {
        // Arrange
        let (emulator, mut uc) = use_case();

        // Act – controller's right edge means we enter from our left edge
        uc.handle(1, 0, &to_remote(Edge::Right)).unwrap();

        // Assert
        assert_eq!(uc.mode(), EmulationMode::Injecting);
        assert_eq!(emulator.emitted(), vec![EmittedInput::MoveAbsolute(1, 540)]);
    }

    #[test]
    fn test_injecting_replays_every_input_kind() {
        // Arrange
        let (emulator, mut uc) = use_case();
        uc.handle(1, 0, &to_remote(Edge::Top)).unwrap();

        // Act
        uc.handle(
            1,
            1,
            &Message::Input(InputEvent::MouseMove {
                x: 10,
                y: 10,
                dx: 4,
                dy: -2,
            }),
        )
        .unwrap();
        uc.handle(
            1,
            2,
            &Message::Input(InputEvent::MouseButton {
                button: MouseButton::Left,
                state: PressState::Pressed,
                x: 0,
                y: 0,
            }),
        )
        .unwrap();
        uc.handle(1, 3, &Message::Input(InputEvent::MouseScroll { dx: 0, dy: 3 }))
            .unwrap();
        uc.handle(1, 4, &key(KeyCode::A, PressState::Pressed)).unwrap();

        // Assert
        assert_eq!(
            emulator.emitted()[1..],
            [
                EmittedInput::MoveRelative(4, -2),
                EmittedInput::Button(MouseButton::Left, PressState::Pressed),
                EmittedInput::Scroll(0, 3),
                EmittedInput::Key(KeyCode::A, PressState::Pressed),
            ]
        );
        assert_eq!(uc.held_count(), 2);
    }

    #[test]
    fn test_to_local_releases_held_keys_and_buttons() {
        // Arrange
        let (emulator, mut uc) = use_case();
        uc.handle(1, 0, &to_remote(Edge::Right)).unwrap();
        uc.handle(1, 1, &key(KeyCode::LEFT_SHIFT, PressState::Pressed)).unwrap();
        uc.handle(1, 2, &key(KeyCode::A, PressState::Pressed)).unwrap();
        uc.handle(
            1,
            3,
            &Message::Input(InputEvent::MouseButton {
                button: MouseButton::Right,
                state: PressState::Pressed,
                x: 0,
                y: 0,
            }),
        )
        .unwrap();
        emulator.clear();

        // Act
        uc.handle(1, 4, &to_local()).unwrap();

        // Assert
        assert_eq!(uc.mode(), EmulationMode::Idle);
        assert_eq!(
            emulator.emitted(),
            vec![
                EmittedInput::Key(KeyCode::A, PressState::Released),
                EmittedInput::Key(KeyCode::LEFT_SHIFT, PressState::Released),
                EmittedInput::Button(MouseButton::Right, PressState::Released),
            ]
        );
        assert_eq!(uc.held_count(), 0);
    }

    #[test]
    fn test_released_keys_are_not_released_again() {
        let (emulator, mut uc) = use_case();
        uc.handle(1, 0, &to_remote(Edge::Right)).unwrap();
        uc.handle(1, 1, &key(KeyCode::A, PressState::Pressed)).unwrap();
        uc.handle(1, 2, &key(KeyCode::A, PressState::Released)).unwrap();
        emulator.clear();

        uc.handle(1, 3, &to_local()).unwrap();

        assert!(emulator.emitted().is_empty());
    }

    #[test]
    fn test_link_lost_releases_and_goes_idle() {
        // Arrange
        let (emulator, mut uc) = use_case();
        uc.handle(1, 0, &to_remote(Edge::Right)).unwrap();
        uc.handle(1, 1, &key(KeyCode::LEFT_CTRL, PressState::Pressed)).unwrap();
        emulator.clear();

        // Act
        uc.on_link_lost().unwrap();

        // Assert
        assert_eq!(uc.mode(), EmulationMode::Idle);
        assert_eq!(
            emulator.emitted(),
            vec![EmittedInput::Key(KeyCode::LEFT_CTRL, PressState::Released)]
        );
    }

    // ── Watermark ─────────────────────────────────────────────────────────────

    #[test]
    fn test_duplicate_sequence_is_stale() {
        let (_emulator, mut uc) = use_case();
        uc.handle(1, 0, &to_remote(Edge::Right)).unwrap();
        uc.handle(1, 1, &key(KeyCode::A, PressState::Pressed)).unwrap();

        let d = uc.handle(1, 1, &key(KeyCode::A, PressState::Pressed)).unwrap();

        assert_eq!(d, Disposition::Stale);
    }

    #[test]
    fn test_new_epoch_restarts_sequences_and_old_epoch_is_stale() {
        // Arrange
        let (emulator, mut uc) = use_case();
        uc.handle(1, 0, &to_remote(Edge::Right)).unwrap();
        uc.handle(1, 500, &key(KeyCode::A, PressState::Pressed)).unwrap();
        uc.on_link_lost().unwrap();

        // Act
        let fresh = uc.handle(2, 0, &to_remote(Edge::Right)).unwrap();
        let leftover = uc.handle(1, 501, &key(KeyCode::Z, PressState::Pressed)).unwrap();

        // Assert
        assert_eq!(fresh, Disposition::Applied);
        assert_eq!(leftover, Disposition::Stale);
        assert_eq!(uc.watermark(), Some((2, 0)));
        assert!(!emulator
            .emitted()
            .contains(&EmittedInput::Key(KeyCode::Z, PressState::Pressed)));
    }

    #[test]
    fn test_sequence_wrap_within_one_link_keeps_applying() {
        // Arrange
        let (emulator, mut uc) = use_case();
        uc.handle(3, u32::MAX - 1, &to_remote(Edge::Right)).unwrap();

        // Act
        let before_wrap = uc.handle(3, u32::MAX, &key(KeyCode::A, PressState::Pressed)).unwrap();
        let after_wrap = uc.handle(3, 0, &key(KeyCode::A, PressState::Released)).unwrap();
        let replay = uc.handle(3, u32::MAX, &key(KeyCode::Z, PressState::Pressed)).unwrap();

        // Assert
        assert_eq!(before_wrap, Disposition::Applied);
        assert_eq!(after_wrap, Disposition::Applied);
        assert_eq!(replay, Disposition::Stale);
        assert_eq!(uc.watermark(), Some((3, 0)));
        assert!(emulator
            .emitted()
            .contains(&EmittedInput::Key(KeyCode::A, PressState::Released)));
    }

    #[test]
    fn test_emulator_failure_is_surfaced() {
        // Arrange
        let emulator = Arc::new(MockInputEmulator::failing());
        let mut uc = EmulateInputUseCase::new(emulator, ScreenGeometry::single(1920, 1080));

        // Act
        let result = uc.handle(1, 0, &to_remote(Edge::Right));

        // Assert
        assert!(matches!(result, Err(EmulationError::Platform(_))));
        assert_eq!(uc.mode(), EmulationMode::Injecting);
    }

    // ── Event pump ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_run_emulation_applies_events_and_releases_on_loss() {
        // Arrange
        let (emulator, uc) = use_case();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run_emulation(uc, rx, CancellationToken::new()));

        // Act
        tx.send(LinkEvent::Connected { epoch: 1 }).await.unwrap();
        tx.send(LinkEvent::Message {
            epoch: 1,
            sequence: 0,
            message: to_remote(Edge::Right),
        })
        .await
        .unwrap();
        tx.send(LinkEvent::Message {
            epoch: 1,
            sequence: 1,
            message: key(KeyCode::A, PressState::Pressed),
        })
        .await
        .unwrap();
        tx.send(LinkEvent::Lost { epoch: 1 }).await.unwrap();
        drop(tx);
        let uc = task.await.unwrap();

        // Assert
        assert_eq!(uc.mode(), EmulationMode::Idle);
        assert_eq!(
            emulator.emitted(),
            vec![
                EmittedInput::MoveAbsolute(1, 540),
                EmittedInput::Key(KeyCode::A, PressState::Pressed),
                EmittedInput::Key(KeyCode::A, PressState::Released),
            ]
        );
    }
}
