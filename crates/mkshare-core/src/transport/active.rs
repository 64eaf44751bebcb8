//! The established-session loop.
//!
//! [`run_active`] owns the [`LinkReader`] for the lifetime of a session and
//! multiplexes four sources with `tokio::select!`:
//!
//! 1. the cancellation token (local shutdown),
//! 2. inbound frames,
//! 3. the heartbeat tick,
//! 4. the liveness deadline.
//!
//! Application messages (`Input`, `ControlTransfer`) are forwarded to the
//! caller in arrival order through a bounded channel.  Session-control
//! messages (`Heartbeat`, `Disconnect`, `Error`) are handled here.

use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::session::{LivenessConfig, LivenessMonitor};
use crate::protocol::messages::{DisconnectReason, ErrorCode, ErrorMessage, Message};
use crate::transport::error::SessionError;
use crate::transport::link::{Inbound, LinkReader, LinkWriter};

/// An application message forwarded out of [`run_active`].
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub sequence: u32,
    pub message: Message,
}

/// Why an active session stopped.
#[derive(Debug)]
pub enum EndReason {
    /// The local cancellation token fired; `Disconnect{Shutdown}` was sent.
    Cancelled,
    /// The peer said goodbye.
    PeerDisconnected(DisconnectReason),
    /// The session failed: EOF, I/O or protocol error, or liveness timeout.
    Failed(SessionError),
}

/// Returned by [`run_active`] once the session is over.
#[derive(Debug)]
pub struct SessionEnd {
    pub reason: EndReason,
    pub last_heartbeat_sent: Option<Instant>,
    pub last_heartbeat_received: Option<Instant>,
}

impl SessionEnd {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.reason, EndReason::Cancelled)
    }
}

/// Link counters reported while a session runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkActivity {
    pub last_heartbeat_sent: Option<Instant>,
    pub last_heartbeat_received: Option<Instant>,
    pub next_send_sequence: u32,
}

/// Drives an established session until it ends.
///
/// Never returns an error: every way a session can stop is described by
/// [`SessionEnd::reason`].  The caller decides whether to reconnect.
pub async fn run_active(
    reader: LinkReader,
    writer: LinkWriter,
    liveness: LivenessConfig,
    inbound_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) -> SessionEnd {
    run_active_observed(reader, writer, liveness, inbound_tx, cancel, |_| {}).await
}

/// [`run_active`], calling `on_activity` whenever a heartbeat is sent or
/// received so observers see live link state.
///
/// Every wait inside the loop is bounded by the liveness timeout and by
/// `cancel`.  A peer that stops reading or a consumer that stops draining
/// `inbound_tx` therefore ends the session with
/// [`SessionError::LivenessTimeout`] instead of wedging it.
pub async fn run_active_observed<F>(
    mut reader: LinkReader,
    writer: LinkWriter,
    liveness: LivenessConfig,
    inbound_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    mut on_activity: F,
) -> SessionEnd
where
    F: FnMut(LinkActivity) + Send,
{
    let mut heartbeat = tokio::time::interval(liveness.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut monitor = LivenessMonitor::new(liveness, now());
    let mut activity = LinkActivity {
        next_send_sequence: writer.next_sequence(),
        ..LinkActivity::default()
    };
    on_activity(activity);

    let reason = loop {
        let deadline = tokio::time::Instant::from_std(monitor.deadline());

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                break Stall::Cancelled.end(&writer, liveness).await;
            }

            frame = reader.next_frame() => {
                let inbound = match frame {
                    Ok(Some(inbound)) => inbound,
                    Ok(None) => break EndReason::Failed(SessionError::Closed),
                    Err(e) => {
                        if matches!(e, SessionError::Protocol(_)) {
                            farewell(&writer, DisconnectReason::ProtocolError, liveness).await;
                        }
                        break EndReason::Failed(e);
                    }
                };
                monitor.record_received(now());

                match inbound {
                    Inbound::Unknown { type_byte, sequence } => {
                        warn!(type_byte, sequence, "unknown message type from peer");
                        let reply = Message::Error(ErrorMessage {
                            code: ErrorCode::UnknownMessageType,
                            message: format!("unknown message type 0x{type_byte:02X}"),
                        });
                        if let Err(reason) = send_bounded(&writer, reply, liveness, &cancel).await {
                            break reason;
                        }
                    }
                    Inbound::Message { message: Message::Heartbeat { timestamp_ms }, .. } => {
                        debug!(timestamp_ms, "heartbeat received");
                        activity.last_heartbeat_received = Some(now());
                        activity.next_send_sequence = writer.next_sequence();
                        on_activity(activity);
                    }
                    Inbound::Message { message: Message::Disconnect { reason }, .. } => {
                        info!(?reason, "peer disconnected");
                        break EndReason::PeerDisconnected(reason);
                    }
                    Inbound::Message { message: Message::Error(err), .. } => {
                        warn!(code = ?err.code, message = %err.message, "peer reported error");
                    }
                    Inbound::Message {
                        message: message @ (Message::Handshake(_) | Message::HandshakeAck(_)),
                        ..
                    } => {
                        let got = message.message_type();
                        warn!(?got, "handshake message on active session");
                        let reply = Message::Error(ErrorMessage {
                            code: ErrorCode::UnexpectedMessage,
                            message: format!("unexpected {got:?} on active session"),
                        });
                        if let Err(reason) = send_bounded(&writer, reply, liveness, &cancel).await {
                            break reason;
                        }
                    }
                    Inbound::Message { sequence, message } => {
                        let forward = inbound_tx.send(InboundMessage { sequence, message });
                        match bounded(forward, liveness.timeout(), &cancel).await {
                            Ok(Ok(())) => {}
                            Ok(Err(_)) => {
                                debug!("inbound consumer gone; closing session");
                                break EndReason::Failed(SessionError::Closed);
                            }
                            Err(stall) => {
                                warn!("inbound consumer stopped draining");
                                break stall.end(&writer, liveness).await;
                            }
                        }
                    }
                }
            }

            _ = heartbeat.tick() => {
                let timestamp_ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                let beat = Message::Heartbeat { timestamp_ms };
                if let Err(reason) = send_bounded(&writer, beat, liveness, &cancel).await {
                    break reason;
                }
                activity.last_heartbeat_sent = Some(now());
                activity.next_send_sequence = writer.next_sequence();
                on_activity(activity);
            }

            _ = tokio::time::sleep_until(deadline) => {
                let silent_for = monitor.silent_for(now());
                warn!(?silent_for, "peer liveness timeout");
                farewell(&writer, DisconnectReason::Timeout, liveness).await;
                break EndReason::Failed(SessionError::LivenessTimeout { silent_for });
            }
        }
    };

    SessionEnd {
        reason,
        last_heartbeat_sent: activity.last_heartbeat_sent,
        last_heartbeat_received: activity.last_heartbeat_received,
    }
}

/// Why a bounded wait inside the session loop gave up.
enum Stall {
    Cancelled,
    TimedOut(Duration),
}

impl Stall {
    /// Says goodbye to the peer and describes how the session ended.
    async fn end(self, writer: &LinkWriter, liveness: LivenessConfig) -> EndReason {
        match self {
            Stall::Cancelled => {
                info!("session cancelled locally");
                farewell(writer, DisconnectReason::Shutdown, liveness).await;
                EndReason::Cancelled
            }
            Stall::TimedOut(silent_for) => {
                warn!(?silent_for, "session stalled");
                farewell(writer, DisconnectReason::Timeout, liveness).await;
                EndReason::Failed(SessionError::LivenessTimeout { silent_for })
            }
        }
    }
}

/// Runs `fut` unless `cancel` fires or `limit` elapses first.
async fn bounded<F: Future>(
    fut: F,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<F::Output, Stall> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stall::Cancelled),
        out = fut => Ok(out),
        _ = tokio::time::sleep(limit) => Err(Stall::TimedOut(limit)),
    }
}

async fn send_bounded(
    writer: &LinkWriter,
    message: Message,
    liveness: LivenessConfig,
    cancel: &CancellationToken,
) -> Result<(), EndReason> {
    match bounded(writer.send(message), liveness.timeout(), cancel).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(EndReason::Failed(e)),
        Err(stall) => Err(stall.end(writer, liveness).await),
    }
}

/// Current time on the tokio clock, so paused-time tests stay consistent.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Best-effort `Disconnect`.  Bounded by one heartbeat interval so a wedged
/// peer cannot stall shutdown.
async fn farewell(writer: &LinkWriter, reason: DisconnectReason, liveness: LivenessConfig) {
    let send = writer.send(Message::Disconnect { reason });
    match tokio::time::timeout(liveness.heartbeat_interval, send).await {
        Ok(Ok(_)) => debug!(?reason, "disconnect sent"),
        Ok(Err(e)) => debug!(?reason, error = %e, "disconnect not delivered"),
        Err(_) => debug!(?reason, "disconnect timed out"),
    }
}
