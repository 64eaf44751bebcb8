//! EventRouter: decides where each captured input event goes.
//!
//! This use case is the heart of the controller.  It owns the
//! [`OwnershipMachine`] and reacts to two streams:
//!
//! - **pointer samples** from the sampler task, which may hand ownership to
//!   the peer once the cursor has dwelt on a configured edge, and
//! - **captured input** from the OS hooks, which is forwarded to the peer
//!   while it owns input and ignored otherwise.
//!
//! # Architecture
//!
//! The router depends only on traits (`MessageSink`, `CursorController`,
//! `InputSource`) and domain types.  All infrastructure implementations are
//! injected at construction time, making the use case fully unit-testable.
//!
//! All mutable state sits behind one `tokio::sync::Mutex`.  Messages are
//! handed to the sink while that lock is held, so a transfer is always queued
//! before any input routed after it.  The sink only enqueues: nothing under
//! the lock waits on the network, so a peer that stops reading cannot stall
//! the pointer sampler or the recall key.

use std::sync::Arc;
use std::time::Instant;

use mkshare_core::protocol::{ControlTransferMessage, InputEvent, KeyCode, Message, PressState};
use mkshare_core::{
    Owner, OwnershipConfig, OwnershipMachine, OwnershipTransition, PointerSample, ScreenGeometry,
    SessionError,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::input_capture::{CaptureMode, CapturedInput, InputSource};

/// Error type for the route-input use case.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no active peer")]
    NoPeer,
    #[error("failed to send to peer: {0}")]
    Send(#[from] SessionError),
}

/// Outbound path to the connected peer.
///
/// The production implementation is the listener's peer slot, which queues
/// for the session's writer task; tests record calls.
pub trait MessageSink: Send + Sync {
    /// Returns `true` while a peer has completed the handshake.
    fn is_active(&self) -> bool;

    /// Queues `message` for the peer without waiting.
    ///
    /// # Errors
    ///
    /// [`SessionError::OutboundFull`] when the peer is not keeping up, or
    /// [`SessionError::Closed`] when no session is attached.
    fn send(&self, message: Message) -> Result<(), SessionError>;
}

/// Trait for controlling the physical cursor of the controller.
#[cfg_attr(test, mockall::automock)]
pub trait CursorController: Send + Sync {
    /// Teleports the physical cursor to (x, y) in virtual-desktop coordinates.
    fn teleport_cursor(&self, x: i32, y: i32);

    /// Returns the current physical cursor position.
    fn cursor_position(&self) -> (i32, i32);
}

/// Mutable router state, guarded by a single mutex.
struct RouterState {
    machine: OwnershipMachine,
    geometry: ScreenGeometry,
    /// Where the cursor is parked while the peer owns input.
    anchor: Option<(i32, i32)>,
}

/// The outbound event router.
pub struct EventRouter {
    state: Mutex<RouterState>,
    recall_key: KeyCode,
    sink: Arc<dyn MessageSink>,
    cursor: Arc<dyn CursorController>,
    source: Arc<dyn InputSource>,
}

impl EventRouter {
    pub fn new(
        ownership: OwnershipConfig,
        geometry: ScreenGeometry,
        recall_key: KeyCode,
        sink: Arc<dyn MessageSink>,
        cursor: Arc<dyn CursorController>,
        source: Arc<dyn InputSource>,
    ) -> Self {
        Self {
            state: Mutex::new(RouterState {
                machine: OwnershipMachine::new(ownership),
                geometry,
                anchor: None,
            }),
            recall_key,
            sink,
            cursor,
            source,
        }
    }

    /// Current owner of input.
    pub async fn owner(&self) -> Owner {
        self.state.lock().await.machine.owner()
    }

    /// Feeds one pointer sample into the ownership machine.
    ///
    /// Without an active peer the machine is kept disarmed: control can never
    /// move to a peer that is not there.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Send`] if the `ControlTransfer` could not be
    /// queued; ownership is then rolled back to local.
    pub async fn handle_pointer_sample(
        &self,
        x: i32,
        y: i32,
        at: Instant,
    ) -> Result<Option<OwnershipTransition>, RouteError> {
        let mut state = self.state.lock().await;

        if !self.sink.is_active() {
            state.machine.disarm();
            return Ok(None);
        }

        let RouterState {
            machine, geometry, ..
        } = &mut *state;
        let Some(transition) = machine.on_sample(PointerSample { x, y, at }, geometry) else {
            return Ok(None);
        };

        if let OwnershipTransition::ToRemote { edge, warp } = transition {
            self.cursor.teleport_cursor(warp.0, warp.1);
            state.anchor = Some(warp);
            self.source.set_capture_mode(CaptureMode::Suppress);

            let message = Message::ControlTransfer(ControlTransferMessage::to_remote(edge));
            if let Err(e) = self.sink.send(message) {
                warn!(?edge, error = %e, "control transfer failed; staying local");
                state.machine.force_local();
                state.anchor = None;
                self.source.set_capture_mode(CaptureMode::PassThrough);
                return Err(e.into());
            }
            info!(?edge, warp_x = warp.0, warp_y = warp.1, "control transferred to peer");
        }
        Ok(Some(transition))
    }

    /// Routes one captured event.
    ///
    /// While the owner is local the OS has already applied the event and
    /// nothing is sent.  While remote, the recall key takes control back and
    /// everything else is forwarded.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Send`] if the event could not be queued for the
    /// peer.
    pub async fn handle_event(&self, event: CapturedInput) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        if state.machine.owner() == Owner::Local {
            return Ok(());
        }

        let outbound = match event {
            CapturedInput::Key { key, state: press, .. } if key == self.recall_key => {
                if press == PressState::Pressed {
                    return self.recall(&mut state);
                }
                // Release of the recall key never reaches the peer.
                return Ok(());
            }
            CapturedInput::MouseMove { x, y } => {
                let (ax, ay) = state.anchor.unwrap_or((x, y));
                let (dx, dy) = (x - ax, y - ay);
                if dx == 0 && dy == 0 {
                    // The warp back to the anchor shows up as a move too.
                    return Ok(());
                }
                self.cursor.teleport_cursor(ax, ay);
                InputEvent::MouseMove { x, y, dx, dy }
            }
            other => other.to_input_event(),
        };

        if !self.sink.is_active() {
            return Err(RouteError::NoPeer);
        }
        self.sink.send(Message::Input(outbound))?;
        Ok(())
    }

    /// Forces ownership back to local after the peer link is gone.
    pub async fn on_peer_lost(&self) {
        let mut state = self.state.lock().await;
        let was_remote = state.machine.force_local();
        state.anchor = None;
        if was_remote {
            self.source.set_capture_mode(CaptureMode::PassThrough);
            info!("peer lost while it owned input; control returned to local");
        } else {
            debug!("peer lost");
        }
    }

    fn recall(&self, state: &mut RouterState) -> Result<(), RouteError> {
        if state.machine.on_recall().is_none() {
            return Ok(());
        }
        state.anchor = None;
        let sent = self
            .sink
            .send(Message::ControlTransfer(ControlTransferMessage::to_local()));
        self.source.set_capture_mode(CaptureMode::PassThrough);
        info!("recall key pressed; control returned to local");
        sent.map_err(RouteError::from)
    }
}

/// Pumps captured events into `router` until the stream ends or `cancel`
/// fires.
pub async fn run_capture_pump(
    router: Arc<EventRouter>,
    mut events: UnboundedReceiver<CapturedInput>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("capture stream closed");
                    break;
                };
                if let Err(e) = router.handle_event(event).await {
                    warn!(error = %e, "failed to route captured input");
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
