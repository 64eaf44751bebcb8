//! Network infrastructure for the controlled peer.
//!
//! [`ClientConnection`] dials the controller and keeps a session alive for as
//! long as it runs:
//!
//! ```text
//! Disconnected → Connecting → Handshaking → Active
//!                    ▲                        │ failure / liveness timeout
//!                    └──── Reconnecting ◀─────┘   (backoff)
//! ```
//!
//! Every transition goes through [`SessionLifecycle`], is logged, and is
//! published as a [`SessionSnapshot`] on a `watch` channel.  Each TCP
//! connection starts from a fresh snapshot; heartbeat times and the send
//! sequence are republished live while the session is active.
//!
//! Each successful connection also gets a new *epoch*; application frames
//! are forwarded as [`LinkEvent`]s tagged with it.

use std::time::Duration;

use mkshare_core::protocol::{Message, PeerRole, ScreenInfoMessage};
use mkshare_core::transport::{
    handshake_initiator, run_active_observed, split_link, EndReason, InboundMessage, LinkActivity,
};
use mkshare_core::{
    LivenessConfig, ReconnectPolicy, SessionError, SessionEvent, SessionLifecycle,
    SessionSnapshot, SessionState,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::emulate_input::LinkEvent;

/// Buffer between the session loop and the epoch tagger.
const INBOUND_CAPACITY: usize = 256;

/// Configuration for the client's network connection.
#[derive(Debug, Clone)]
pub struct ClientConnectionConfig {
    /// `host:port` of the controller.
    pub server_addr: String,
    /// This client's UUID, sent in the handshake.
    pub client_id: Uuid,
    pub liveness: LivenessConfig,
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Primary display size, reported to the controller after each handshake.
    pub screen: ScreenInfoMessage,
}

/// Manages the connection from the controlled peer to the controller.
pub struct ClientConnection {
    config: ClientConnectionConfig,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl ClientConnection {
    /// Creates a new (not yet connected) `ClientConnection`.
    pub fn new(config: ClientConnectionConfig) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self { config, snapshot }
    }

    /// Observes session snapshots.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    /// Connects, and reconnects, until `cancel` fires or the retry budget is
    /// spent.  Returns the final state, which is always `Disconnected`.
    pub async fn run(&self, events: mpsc::Sender<LinkEvent>, cancel: CancellationToken) -> SessionState {
        let mut lifecycle = SessionLifecycle::new(self.config.reconnect.clone());
        let mut epoch: u64 = 0;
        let mut retry_delay = self.step(&mut lifecycle, SessionEvent::Start);

        loop {
            let event = match lifecycle.state() {
                SessionState::Disconnected => break,
                _ if cancel.is_cancelled() => SessionEvent::Shutdown,
                SessionState::Connecting => {
                    let addr = self.config.server_addr.as_str();
                    let connected = tokio::select! {
                        _ = cancel.cancelled() => {
                            retry_delay = self.step(&mut lifecycle, SessionEvent::Shutdown);
                            continue;
                        }
                        connected = TcpStream::connect(addr) => connected,
                    };
                    match connected {
                        Ok(stream) => {
                            self.step(&mut lifecycle, SessionEvent::TransportConnected);
                            epoch += 1;
                            self.run_session(stream, epoch, &mut lifecycle, &events, &cancel)
                                .await
                        }
                        Err(e) => {
                            warn!(%addr, error = %e, "could not connect to controller");
                            SessionEvent::TransportFailed
                        }
                    }
                }
                SessionState::Reconnecting => {
                    if let Some(delay) = retry_delay {
                        info!(?delay, attempt = lifecycle.failures(), "reconnecting after delay");
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                retry_delay = self.step(&mut lifecycle, SessionEvent::Shutdown);
                                continue;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        warn!(failures = lifecycle.failures(), "retry budget exhausted");
                    }
                    SessionEvent::RetryDue
                }
                // Handshaking and Active are driven inside `run_session`.
                SessionState::Handshaking | SessionState::Active => SessionEvent::TransportFailed,
            };
            retry_delay = self.step(&mut lifecycle, event);
        }

        lifecycle.state()
    }

    /// Runs one connection from handshake to teardown and returns the event
    /// that ended it.  Leaves the lifecycle in `Handshaking` or `Active`.
    async fn run_session(
        &self,
        stream: TcpStream,
        epoch: u64,
        lifecycle: &mut SessionLifecycle,
        events: &mpsc::Sender<LinkEvent>,
        cancel: &CancellationToken,
    ) -> SessionEvent {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable Nagle");
        }
        let (mut reader, writer) = split_link(stream);

        let handshake = tokio::select! {
            _ = cancel.cancelled() => return SessionEvent::Shutdown,
            result = handshake_initiator(
                &mut reader,
                &writer,
                self.config.client_id,
                self.config.handshake_timeout,
            ) => result,
        };
        if let Err(e) = handshake {
            warn!(error = %e, "handshake failed");
            return match e {
                SessionError::HandshakeRejected { .. } => SessionEvent::HandshakeRejected,
                SessionError::HandshakeTimeout => SessionEvent::HandshakeTimedOut,
                _ => SessionEvent::TransportFailed,
            };
        }

        self.step(lifecycle, SessionEvent::HandshakeAccepted);
        self.publish(|s| SessionSnapshot {
            peer_role: Some(PeerRole::Controller),
            ..s.clone()
        });

        let screen = self.config.screen;
        let report = writer.send(Message::ScreenInfo(screen));
        match tokio::time::timeout(self.config.handshake_timeout, report).await {
            Ok(Ok(_)) => debug!(width = screen.width, height = screen.height, "screen info sent"),
            Ok(Err(e)) => {
                warn!(error = %e, "could not report screen info");
                return SessionEvent::TransportFailed;
            }
            Err(_) => {
                warn!("timed out reporting screen info");
                return SessionEvent::TransportFailed;
            }
        }

        if events.send(LinkEvent::Connected { epoch }).await.is_err() {
            debug!("link event consumer gone");
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (end, ()) = tokio::join!(
            run_active_observed(
                reader,
                writer.clone(),
                self.config.liveness,
                inbound_tx,
                cancel.clone(),
                |activity| self.publish_activity(activity),
            ),
            forward_inbound(inbound_rx, events, epoch),
        );

        self.publish_activity(LinkActivity {
            last_heartbeat_sent: end.last_heartbeat_sent,
            last_heartbeat_received: end.last_heartbeat_received,
            next_send_sequence: writer.next_sequence(),
        });
        if events.send(LinkEvent::Lost { epoch }).await.is_err() {
            debug!("link event consumer gone");
        }

        match end.reason {
            EndReason::Cancelled => SessionEvent::Shutdown,
            EndReason::PeerDisconnected(reason) => {
                info!(?reason, "controller closed the session");
                SessionEvent::PeerDisconnected
            }
            EndReason::Failed(SessionError::LivenessTimeout { silent_for }) => {
                warn!(?silent_for, "controller went silent");
                SessionEvent::LivenessExpired
            }
            EndReason::Failed(e) => {
                warn!(error = %e, "session failed");
                SessionEvent::TransportFailed
            }
        }
    }

    /// Applies `event`, logs the transition, and publishes a snapshot.
    /// Returns the retry delay, if the transition scheduled one.
    fn step(&self, lifecycle: &mut SessionLifecycle, event: SessionEvent) -> Option<Duration> {
        match lifecycle.apply(event) {
            Ok(t) => {
                info!(from = %t.from, to = %t.to, ?event, "session transition");
                if matches!(event, SessionEvent::TransportConnected) {
                    // A new connection never inherits the previous one's counters.
                    self.snapshot.send_replace(SessionSnapshot::new(t.to));
                } else {
                    self.publish(|s| SessionSnapshot {
                        state: t.to,
                        peer_role: if t.to.is_active() { s.peer_role } else { None },
                        ..s.clone()
                    });
                }
                t.retry_delay
            }
            Err(e) => {
                warn!(error = %e, "ignoring invalid session event");
                None
            }
        }
    }

    /// Publishes the snapshot built from the current one by `next`.
    fn publish(&self, next: impl FnOnce(&SessionSnapshot) -> SessionSnapshot) {
        let snapshot = next(&self.snapshot.borrow());
        self.snapshot.send_replace(snapshot);
    }

    fn publish_activity(&self, activity: LinkActivity) {
        self.publish(|s| SessionSnapshot {
            last_heartbeat_sent: activity.last_heartbeat_sent,
            last_heartbeat_received: activity.last_heartbeat_received,
            next_send_sequence: activity.next_send_sequence,
            ..s.clone()
        });
    }
}

/// Tags each inbound message with the link epoch and passes it on.
async fn forward_inbound(
    mut inbound: mpsc::Receiver<InboundMessage>,
    events: &mpsc::Sender<LinkEvent>,
    epoch: u64,
) {
    while let Some(InboundMessage { sequence, message }) = inbound.recv().await {
        let event = LinkEvent::Message {
            epoch,
            sequence,
            message,
        };
        if events.send(event).await.is_err() {
            debug!("link event consumer gone; closing session");
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(addr: String, max_retries: Option<u32>) -> ClientConnectionConfig {
        ClientConnectionConfig {
            server_addr: addr,
            client_id: Uuid::new_v4(),
            liveness: LivenessConfig::new(Duration::from_millis(100), 2),
            handshake_timeout: Duration::from_secs(1),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
                max_retries,
            },
            screen: ScreenInfoMessage {
                width: 1920,
                height: 1080,
            },
        }
    }

    /// An address with nothing listening on it.
    async fn dead_addr() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        // Arrange
        let conn = ClientConnection::new(config(dead_addr().await, Some(2)));
        let mut snapshots = conn.subscribe();
        let (tx, _rx) = mpsc::channel(8);

        // Act
        let final_state = conn.run(tx, CancellationToken::new()).await;

        // Assert
        assert_eq!(final_state, SessionState::Disconnected);
        assert_eq!(snapshots.borrow_and_update().state, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_cancel_stops_reconnect_loop() {
        // Arrange – unlimited retries against a dead address
        let conn = ClientConnection::new(config(dead_addr().await, None));
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        // Act
        let final_state = tokio::time::timeout(Duration::from_secs(5), conn.run(tx, cancel))
            .await
            .expect("run should stop after cancellation");

        // Assert
        assert_eq!(final_state, SessionState::Disconnected);
    }

    #[test]
    fn test_new_connection_starts_disconnected() {
        let conn = ClientConnection::new(config("127.0.0.1:1".to_string(), None));
        assert_eq!(*conn.subscribe().borrow(), SessionSnapshot::default());
    }
}
