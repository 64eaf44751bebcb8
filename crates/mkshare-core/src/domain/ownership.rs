//! Edge-dwell ownership state machine.
//!
//! Decides, from a stream of local pointer samples and a keyboard recall
//! signal, whether the controller's own desktop or the controlled peer is
//! authoritative for input.
//!
//! ```text
//!               in band                     dwell elapsed
//! OwnerLocal ───────────────▶ Armed(edge) ────────────────▶ OwnerRemote
//!     ▲        ◀───────────────    │                            │
//!     │          left the band     │ other edge in band:        │
//!     │                            └─ re-arm, timer restarts    │
//!     └──────────────────── recall key / force_local ───────────┘
//! ```
//!
//! A single threshold crossing is too sensitive: normal pointer use grazes
//! the screen edges constantly.  The cursor must stay within
//! `edge_threshold_px` of a configured edge for `edge_dwell` before control
//! moves.  Leaving the band, or drifting into the band of a different edge,
//! restarts the wait.
//!
//! The machine is synchronous and takes timestamps from its caller, so it is
//! tested with synthetic [`Instant`]s rather than real waits.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::geometry::{Edge, ScreenGeometry};

/// Tunables for edge detection.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipConfig {
    /// Edges that hand control to the peer.  Order breaks distance ties.
    pub edges: Vec<Edge>,
    /// Maximum distance, in pixels, at which the cursor counts as "at" an edge.
    pub edge_threshold_px: u32,
    /// How long the cursor must stay in band before control transfers.
    pub edge_dwell: Duration,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        Self {
            edges: vec![Edge::Right],
            edge_threshold_px: 5,
            edge_dwell: Duration::from_millis(300),
        }
    }
}

/// Which side currently owns input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Local,
    Remote,
}

/// Internal phase of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipPhase {
    OwnerLocal,
    Armed { edge: Edge, since: Instant },
    OwnerRemote { edge: Edge },
}

/// One cursor position reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSample {
    pub x: i32,
    pub y: i32,
    pub at: Instant,
}

/// A decided ownership change.  The caller performs the side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipTransition {
    /// Control moves to the peer.  `warp` is where the local cursor should be
    /// placed so it no longer sits in the edge band.
    ToRemote { edge: Edge, warp: (i32, i32) },
    /// Control returns to the local desktop.
    ToLocal,
}

/// The edge-dwell state machine.
#[derive(Debug, Clone)]
pub struct OwnershipMachine {
    config: OwnershipConfig,
    phase: OwnershipPhase,
}

impl OwnershipMachine {
    pub fn new(config: OwnershipConfig) -> Self {
        Self {
            config,
            phase: OwnershipPhase::OwnerLocal,
        }
    }

    pub fn config(&self) -> &OwnershipConfig {
        &self.config
    }

    pub fn phase(&self) -> OwnershipPhase {
        self.phase
    }

    pub fn owner(&self) -> Owner {
        match self.phase {
            OwnershipPhase::OwnerRemote { .. } => Owner::Remote,
            _ => Owner::Local,
        }
    }

    /// Feeds one pointer sample.
    ///
    /// Returns `Some(ToRemote)` exactly once per dwell satisfaction; while
    /// the owner is remote every sample is ignored.
    pub fn on_sample(
        &mut self,
        sample: PointerSample,
        geometry: &ScreenGeometry,
    ) -> Option<OwnershipTransition> {
        let armed = match self.phase {
            OwnershipPhase::OwnerRemote { .. } => return None,
            OwnershipPhase::Armed { edge, since } => Some((edge, since)),
            OwnershipPhase::OwnerLocal => None,
        };

        let display = geometry.display_at(sample.x, sample.y);
        let threshold = self.config.edge_threshold_px;

        let mut nearest: Option<(Edge, u32)> = None;
        let mut armed_still_in_band = false;
        for &edge in &self.config.edges {
            if geometry.is_seam(display, edge, sample.x, sample.y) {
                continue;
            }
            let distance = display.edge_distance(edge, sample.x, sample.y);
            if distance > threshold {
                continue;
            }
            if armed.map(|(e, _)| e) == Some(edge) {
                armed_still_in_band = true;
            }
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((edge, distance));
            }
        }

        // Corners: stay on the edge we are already timing rather than
        // restarting the dwell for a marginally closer neighbour.
        let chosen = match armed {
            Some((edge, _)) if armed_still_in_band => Some(edge),
            _ => nearest.map(|(edge, _)| edge),
        };

        let Some(edge) = chosen else {
            if let Some((edge, _)) = armed {
                debug!(?edge, x = sample.x, y = sample.y, "edge disarmed");
            }
            self.phase = OwnershipPhase::OwnerLocal;
            return None;
        };

        let since = match armed {
            Some((armed_edge, since)) if armed_edge == edge => since,
            _ => {
                debug!(?edge, x = sample.x, y = sample.y, "edge armed");
                sample.at
            }
        };

        if sample.at.saturating_duration_since(since) >= self.config.edge_dwell {
            self.phase = OwnershipPhase::OwnerRemote { edge };
            Some(OwnershipTransition::ToRemote {
                edge,
                warp: display.center(),
            })
        } else {
            self.phase = OwnershipPhase::Armed { edge, since };
            None
        }
    }

    /// Handles the keyboard recall signal.
    ///
    /// Returns `Some(ToLocal)` only when the owner was remote.
    pub fn on_recall(&mut self) -> Option<OwnershipTransition> {
        match self.phase {
            OwnershipPhase::OwnerRemote { .. } => {
                self.phase = OwnershipPhase::OwnerLocal;
                Some(OwnershipTransition::ToLocal)
            }
            _ => None,
        }
    }

    /// Unconditionally returns ownership to the local desktop, e.g. when the
    /// peer link drops.  Returns `true` if the owner was remote.
    pub fn force_local(&mut self) -> bool {
        let was_remote = self.owner() == Owner::Remote;
        self.phase = OwnershipPhase::OwnerLocal;
        was_remote
    }

    /// Drops any pending arm without touching a remote owner.
    pub fn disarm(&mut self) {
        if let OwnershipPhase::Armed { .. } = self.phase {
            self.phase = OwnershipPhase::OwnerLocal;
        }
    }
}
