//! Connection lifecycle for the controlled peer.
//!
//! ```text
//! Disconnected ─▶ Connecting ─▶ Handshaking ─▶ Active
//!                    ▲   │           │            │
//!                    │   └───────────┴────────────┤ failure / liveness timeout
//!                    │                            ▼
//!                    └──────── retry due ─── Reconnecting ──▶ Disconnected
//!                                                (retries exhausted)
//! ```
//!
//! [`SessionLifecycle`] is a pure state machine: it never sleeps and never
//! touches a socket.  The connection task drives it with [`SessionEvent`]s and
//! acts on the returned [`Transition`] (e.g. sleeping for `retry_delay`).
//! [`LivenessMonitor`] and [`Backoff`] are likewise clock-injected so they can
//! be tested without waiting.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::protocol::messages::PeerRole;

// ── Constants ─────────────────────────────────────────────────────────────────

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_LIVENESS_MULTIPLIER: u32 = 3;
/// A peer is never declared dead after fewer than two missed heartbeats.
pub const MIN_LIVENESS_MULTIPLIER: u32 = 2;
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(5);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ── State ─────────────────────────────────────────────────────────────────────

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Transport open, handshake in flight.
    Handshaking,
    /// Handshake accepted; heartbeats flowing.
    Active,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Active => write!(f, "Active"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Inputs to [`SessionLifecycle::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Begin connecting from `Disconnected`.
    Start,
    /// The transport opened.
    TransportConnected,
    /// The transport failed (connect error, I/O error, protocol error, EOF).
    TransportFailed,
    HandshakeAccepted,
    HandshakeRejected,
    HandshakeTimedOut,
    /// Nothing heard from the peer for the liveness window.
    LivenessExpired,
    /// The peer sent `Disconnect`.
    PeerDisconnected,
    /// The backoff delay has elapsed.
    RetryDue,
    /// Local shutdown; valid from every state.
    Shutdown,
}

/// The result of a successful [`SessionLifecycle::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// Set when entering `Reconnecting` with retries left: how long to wait
    /// before sending [`SessionEvent::RetryDue`].
    pub retry_delay: Option<Duration>,
}

/// An event that is not valid in the current state.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("event {event:?} is not valid in state {state}")]
pub struct InvalidTransition {
    pub state: SessionState,
    pub event: SessionEvent,
}

// ── Backoff ───────────────────────────────────────────────────────────────────

/// Doubling delay, capped.
///
/// ```rust
/// use std::time::Duration;
/// use mkshare_core::domain::session::Backoff;
///
/// let mut b = Backoff::new(Duration::from_millis(500), Duration::from_secs(2));
/// assert_eq!(b.next_delay(), Duration::from_millis(500));
/// assert_eq!(b.next_delay(), Duration::from_secs(1));
/// assert_eq!(b.next_delay(), Duration::from_secs(2));
/// assert_eq!(b.next_delay(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        let cap = cap.max(base);
        Self {
            base,
            cap,
            next: base,
        }
    }

    /// Returns the delay to wait now and doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

/// How the controlled peer retries a lost connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl ReconnectPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_delay)
    }

    /// Returns `true` if attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE,
            max_delay: DEFAULT_RECONNECT_CAP,
            max_retries: None,
        }
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// The session state machine.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: SessionState,
    policy: ReconnectPolicy,
    backoff: Backoff,
    /// Consecutive failed attempts since the last `Active` period.
    failures: u32,
}

impl SessionLifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let backoff = policy.backoff();
        Self {
            state: SessionState::Disconnected,
            policy,
            backoff,
            failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Consecutive failures since the session was last `Active`.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Applies `event` and returns the resulting transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `event` makes no sense in the
    /// current state; the state is left unchanged.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Transition, InvalidTransition> {
        use SessionEvent as E;
        use SessionState as S;

        let from = self.state;
        let mut retry_delay = None;

        let to = match (from, event) {
            (_, E::Shutdown) => S::Disconnected,
            (S::Disconnected, E::Start) => {
                self.failures = 0;
                self.backoff.reset();
                S::Connecting
            }
            (S::Connecting, E::TransportConnected) => S::Handshaking,
            (S::Handshaking, E::HandshakeAccepted) => {
                self.failures = 0;
                self.backoff.reset();
                S::Active
            }
            (S::Connecting, E::TransportFailed)
            | (S::Handshaking, E::TransportFailed | E::HandshakeRejected | E::HandshakeTimedOut)
            | (S::Active, E::TransportFailed | E::LivenessExpired | E::PeerDisconnected) => {
                self.failures = self.failures.saturating_add(1);
                if self.policy.allows(self.failures) {
                    retry_delay = Some(self.backoff.next_delay());
                }
                S::Reconnecting
            }
            (S::Reconnecting, E::RetryDue) => {
                if self.policy.allows(self.failures) {
                    S::Connecting
                } else {
                    S::Disconnected
                }
            }
            (state, event) => return Err(InvalidTransition { state, event }),
        };

        self.state = to;
        Ok(Transition {
            from,
            to,
            retry_delay,
        })
    }
}

// ── Liveness ──────────────────────────────────────────────────────────────────

/// Heartbeat cadence and how many silent intervals make a peer dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub heartbeat_interval: Duration,
    pub multiplier: u32,
}

impl LivenessConfig {
    /// Builds a config, raising `multiplier` to at least
    /// [`MIN_LIVENESS_MULTIPLIER`].
    pub fn new(heartbeat_interval: Duration, multiplier: u32) -> Self {
        Self {
            heartbeat_interval,
            multiplier: multiplier.max(MIN_LIVENESS_MULTIPLIER),
        }
    }

    /// Silence longer than this ends the session.
    pub fn timeout(&self) -> Duration {
        self.heartbeat_interval
            .saturating_mul(self.multiplier.max(MIN_LIVENESS_MULTIPLIER))
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LIVENESS_MULTIPLIER)
    }
}

/// Tracks when the peer was last heard from.
///
/// Any inbound frame counts, not only heartbeats: a peer streaming input is
/// plainly alive.
#[derive(Debug, Clone, Copy)]
pub struct LivenessMonitor {
    timeout: Duration,
    last_received: Instant,
}

impl LivenessMonitor {
    pub fn new(config: LivenessConfig, now: Instant) -> Self {
        Self {
            timeout: config.timeout(),
            last_received: now,
        }
    }

    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    /// The instant after which the peer is considered dead.
    pub fn deadline(&self) -> Instant {
        self.last_received + self.timeout
    }

    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.silent_for(now) >= self.timeout
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Read-only view of a session, published through a `tokio::sync::watch`
/// channel.  A fresh value is sent on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub peer_role: Option<PeerRole>,
    pub last_heartbeat_sent: Option<Instant>,
    pub last_heartbeat_received: Option<Instant>,
    pub next_send_sequence: u32,
}

impl SessionSnapshot {
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }
}
