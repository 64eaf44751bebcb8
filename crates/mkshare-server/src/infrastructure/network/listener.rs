//! PeerListener: accepts controlled peers over TCP.
//!
//! Each accepted connection is handed to its own task which runs the
//! handshake and then [`run_active`] until the session ends.  While that
//! task holds the [`PeerSlot`] reservation every further connection is
//! dropped straight after `accept`.
//!
//! Router traffic reaches the link through a bounded queue drained by a
//! per-session writer task, so the router never waits on the socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mkshare_core::protocol::Message;
use mkshare_core::transport::{
    handshake_responder, run_active, split_link, EndReason, InboundMessage, LinkWriter,
};
use mkshare_core::LivenessConfig;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::peer_slot::{PeerReservation, PeerSlot};
use crate::application::route_input::EventRouter;

/// Buffer between the session loop and the inbound drain.
const INBOUND_CAPACITY: usize = 64;

/// Router messages waiting for the writer task.  A full queue fails the
/// router's send instead of blocking it.
const OUTBOUND_CAPACITY: usize = 1024;

/// Error type for the network listener.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Session timing shared by every accepted peer.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub liveness: LivenessConfig,
    pub handshake_timeout: Duration,
}

/// The controller's TCP listener.
pub struct PeerListener {
    listener: TcpListener,
    slot: Arc<PeerSlot>,
    router: Arc<EventRouter>,
    settings: SessionSettings,
}

impl PeerListener {
    /// Binds `addr`.  Port 0 picks an ephemeral port; see [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the socket cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        slot: Arc<PeerSlot>,
        router: Arc<EventRouter>,
        settings: SessionSettings,
    ) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NetworkError::BindFailed { addr, source })?;
        Ok(Self {
            listener,
            slot,
            router,
            settings,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts peers until `cancel` fires, then waits for the running
    /// session to say goodbye.
    pub async fn run(self, cancel: CancellationToken) {
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let Some(reservation) = self.slot.try_reserve() else {
                        warn!(%addr, "peer slot occupied; dropping connection");
                        drop(stream);
                        continue;
                    };
                    info!(%addr, "peer connected");
                    sessions.spawn(serve_peer(
                        stream,
                        addr,
                        reservation,
                        Arc::clone(&self.router),
                        self.settings,
                        cancel.child_token(),
                    ));
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "peer session task failed");
                    }
                }
            }
        }

        while let Some(joined) = sessions.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "peer session task failed");
            }
        }
        debug!("listener stopped");
    }
}

/// Runs one peer from handshake to teardown.
async fn serve_peer(
    stream: TcpStream,
    addr: SocketAddr,
    reservation: PeerReservation,
    router: Arc<EventRouter>,
    settings: SessionSettings,
    cancel: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%addr, error = %e, "could not disable Nagle");
    }
    let (mut reader, writer) = split_link(stream);

    let handshake = tokio::select! {
        _ = cancel.cancelled() => return,
        result = handshake_responder(&mut reader, &writer, settings.handshake_timeout) => result,
    };
    let hello = match handshake {
        Ok(hello) => hello,
        Err(e) => {
            warn!(%addr, error = %e, "handshake failed");
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    reservation.attach(outbound_tx, hello.client_id);
    info!(%addr, client_id = %hello.client_id, "peer active");

    let session = cancel.child_token();
    let pump = tokio::spawn(pump_outbound(outbound_rx, writer.clone(), session.clone()));

    // The only application message a controlled peer sends is its screen
    // report; anything else is logged and dropped.
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_CAPACITY);
    let drain = async {
        while let Some(inbound) = inbound_rx.recv().await {
            match inbound.message {
                Message::ScreenInfo(screen) => reservation.record_screen(screen),
                other => debug!(
                    sequence = inbound.sequence,
                    kind = ?other.message_type(),
                    "ignoring application message from controlled peer"
                ),
            }
        }
    };

    let (end, ()) = tokio::join!(
        run_active(reader, writer, settings.liveness, inbound_tx, session.clone()),
        drain,
    );
    session.cancel();
    if let Err(e) = pump.await {
        debug!(error = %e, "outbound writer task failed");
    }

    match &end.reason {
        EndReason::Cancelled => info!(%addr, "peer session closed for shutdown"),
        EndReason::PeerDisconnected(reason) => info!(%addr, ?reason, "peer disconnected"),
        EndReason::Failed(e) => warn!(%addr, error = %e, "peer session failed"),
    }

    // Ownership is back home before a new peer can claim the slot.
    router.on_peer_lost().await;
    drop(reservation);
}

/// Writes queued router messages onto the link in order.  A failed write
/// stops the task; the session loop notices the broken link on its own.
async fn pump_outbound(
    mut outbound: mpsc::Receiver<Message>,
    writer: LinkWriter,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = writer.send(message) => sent,
        };
        if let Err(e) = sent {
            debug!(error = %e, "outbound write failed; writer task stopping");
            break;
        }
    }
}
