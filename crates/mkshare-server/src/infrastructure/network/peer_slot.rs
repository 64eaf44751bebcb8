//! PeerSlot: the controller's single-peer admission policy.
//!
//! Exactly one controlled peer may be connected at a time.  The slot is
//! *reserved* the moment a TCP connection is accepted, so a second dialer
//! is turned away even while the first one is still handshaking.  Once the
//! handshake succeeds the session's outbound queue is *attached* and the slot
//! becomes the router's [`MessageSink`].  Sending only enqueues; the
//! listener's writer task drains the queue onto the link.
//!
//! Dropping the [`PeerReservation`] detaches the queue and frees the slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mkshare_core::protocol::{Message, ScreenInfoMessage};
use mkshare_core::SessionError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::route_input::MessageSink;

#[derive(Debug)]
struct AttachedPeer {
    client_id: Uuid,
    outbound: mpsc::Sender<Message>,
    screen: Option<ScreenInfoMessage>,
}

/// Holder for the one permitted peer.
#[derive(Debug, Default)]
pub struct PeerSlot {
    reserved: AtomicBool,
    attached: Mutex<Option<AttachedPeer>>,
}

impl PeerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot, or returns `None` if a peer already holds it.
    pub fn try_reserve(self: &Arc<Self>) -> Option<PeerReservation> {
        self.reserved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PeerReservation {
                slot: Arc::clone(self),
            })
    }

    /// Returns `true` while the slot is claimed, handshaking or active.
    pub fn is_reserved(&self) -> bool {
        self.reserved.load(Ordering::Acquire)
    }

    /// Client ID of the attached peer, if any.
    pub fn client_id(&self) -> Option<Uuid> {
        self.lock().as_ref().map(|peer| peer.client_id)
    }

    /// Primary display size the attached peer reported, if it has.
    pub fn peer_screen(&self) -> Option<ScreenInfoMessage> {
        self.lock().as_ref().and_then(|peer| peer.screen)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<AttachedPeer>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageSink for PeerSlot {
    fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn send(&self, message: Message) -> Result<(), SessionError> {
        let guard = self.lock();
        let peer = guard.as_ref().ok_or(SessionError::Closed)?;
        peer.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::OutboundFull,
            TrySendError::Closed(_) => SessionError::Closed,
        })
    }
}

/// Proof of ownership of the [`PeerSlot`]; releases it on drop.
#[derive(Debug)]
pub struct PeerReservation {
    slot: Arc<PeerSlot>,
}

impl PeerReservation {
    /// Publishes the handshaken session as the active peer.
    pub fn attach(&self, outbound: mpsc::Sender<Message>, client_id: Uuid) {
        *self.slot.lock() = Some(AttachedPeer {
            client_id,
            outbound,
            screen: None,
        });
        debug!(%client_id, "peer attached");
    }

    /// Remembers the display size the peer reported.
    pub fn record_screen(&self, screen: ScreenInfoMessage) {
        if let Some(peer) = self.slot.lock().as_mut() {
            info!(
                client_id = %peer.client_id,
                width = screen.width,
                height = screen.height,
                "peer screen reported"
            );
            peer.screen = Some(screen);
        }
    }
}

impl Drop for PeerReservation {
    fn drop(&mut self) {
        if let Some(peer) = self.slot.lock().take() {
            debug!(client_id = %peer.client_id, "peer detached");
        }
        self.slot.reserved.store(false, Ordering::Release);
    }
}
