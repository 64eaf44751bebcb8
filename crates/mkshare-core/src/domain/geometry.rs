//! Display geometry: bounds, edges, and distance-to-edge queries.
//!
//! A [`ScreenGeometry`] is an immutable snapshot of the local displays as
//! reported by the screen enumeration capability.  All coordinates are in the
//! OS virtual-desktop space, so secondary displays may sit at negative offsets.
//!
//! # Seams
//!
//! With more than one display, the right edge of one monitor may touch the
//! left edge of another.  The cursor can cross such a seam freely, so the
//! ownership machine must not treat it as a screen boundary.
//! [`ScreenGeometry::is_seam`] answers that question by probing the pixel
//! just beyond the edge.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four sides of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Edge {
    Left = 0x01,
    Right = 0x02,
    Top = 0x03,
    Bottom = 0x04,
}

impl Edge {
    /// All edges, in wire-code order.
    pub const ALL: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom];

    /// Returns the facing edge: leaving the controller through `Right` means
    /// entering the controlled peer through `Left`.
    pub fn opposite(self) -> Edge {
        match self {
            Edge::Left => Edge::Right,
            Edge::Right => Edge::Left,
            Edge::Top => Edge::Bottom,
            Edge::Bottom => Edge::Top,
        }
    }
}

impl TryFrom<u8> for Edge {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Edge::Left),
            0x02 => Ok(Edge::Right),
            0x03 => Ok(Edge::Top),
            0x04 => Ok(Edge::Bottom),
            _ => Err(()),
        }
    }
}

/// Position and size of a single display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl DisplayBounds {
    /// Creates a primary display at the origin.
    pub fn primary(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
            is_primary: true,
        }
    }

    /// Exclusive right bound.
    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Exclusive bottom bound.
    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Returns `true` if the pixel `(x, y)` lies on this display.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Pixel distance from `(x, y)` to `edge`, clamped at zero for points
    /// already past the edge.
    pub fn edge_distance(&self, edge: Edge, x: i32, y: i32) -> u32 {
        let d = match edge {
            Edge::Left => x - self.x,
            Edge::Right => (self.right() - 1) - x,
            Edge::Top => y - self.y,
            Edge::Bottom => (self.bottom() - 1) - y,
        };
        d.max(0) as u32
    }

    /// Midpoint of the display.
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

/// Errors raised when building a [`ScreenGeometry`].
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("no displays reported")]
    NoDisplays,
    #[error("display {index} has zero width or height")]
    EmptyDisplay { index: usize },
}

/// Read-only snapshot of every attached display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenGeometry {
    displays: Vec<DisplayBounds>,
    primary: usize,
}

impl ScreenGeometry {
    /// Builds a snapshot from the enumerated displays.
    ///
    /// If no display is flagged primary, the first one is used.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] for an empty list or a zero-sized display.
    pub fn new(displays: Vec<DisplayBounds>) -> Result<Self, GeometryError> {
        if displays.is_empty() {
            return Err(GeometryError::NoDisplays);
        }
        if let Some(index) = displays.iter().position(|d| d.width == 0 || d.height == 0) {
            return Err(GeometryError::EmptyDisplay { index });
        }
        let primary = displays.iter().position(|d| d.is_primary).unwrap_or(0);
        Ok(Self { displays, primary })
    }

    /// Convenience constructor for a single display at the origin.
    pub fn single(width: u32, height: u32) -> Self {
        Self {
            displays: vec![DisplayBounds::primary(width.max(1), height.max(1))],
            primary: 0,
        }
    }

    pub fn displays(&self) -> &[DisplayBounds] {
        &self.displays
    }

    pub fn primary(&self) -> &DisplayBounds {
        &self.displays[self.primary]
    }

    /// Returns the display under `(x, y)`, falling back to the primary display
    /// when the point is off every display.
    pub fn display_at(&self, x: i32, y: i32) -> &DisplayBounds {
        self.displays
            .iter()
            .find(|d| d.contains(x, y))
            .unwrap_or_else(|| self.primary())
    }

    /// Returns `true` when crossing `edge` of `display` at `(x, y)` lands on
    /// another display rather than leaving the desktop.
    pub fn is_seam(&self, display: &DisplayBounds, edge: Edge, x: i32, y: i32) -> bool {
        let (px, py) = match edge {
            Edge::Left => (display.x - 1, y),
            Edge::Right => (display.right(), y),
            Edge::Top => (x, display.y - 1),
            Edge::Bottom => (x, display.bottom()),
        };
        self.displays
            .iter()
            .any(|d| d != display && d.contains(px, py))
    }

    /// Point just inside `edge` of the primary display, centred along it.
    ///
    /// Used by the controlled peer to place its cursor where the controller's
    /// pointer "entered".
    pub fn entry_point(&self, edge: Edge) -> (i32, i32) {
        let d = self.primary();
        let (cx, cy) = d.center();
        match edge {
            Edge::Left => (d.x + 1, cy),
            Edge::Right => (d.right() - 2, cy),
            Edge::Top => (cx, d.y + 1),
            Edge::Bottom => (cx, d.bottom() - 2),
        }
    }
}

/// Capability for enumerating the local displays.
///
/// Platform adapters query the OS; [`StaticScreenEnumerator`] returns a fixed
/// list for tests and headless runs.
pub trait ScreenEnumerator: Send + Sync {
    /// Returns the connected displays.
    ///
    /// # Errors
    ///
    /// Returns [`ScreenInfoError::Platform`] if the OS query fails.
    fn enumerate_displays(&self) -> Result<Vec<DisplayBounds>, ScreenInfoError>;
}

/// Error type for screen enumeration.
#[derive(Debug, Error)]
pub enum ScreenInfoError {
    #[error("platform API error while enumerating displays: {0}")]
    Platform(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Queries `enumerator` and builds a [`ScreenGeometry`] snapshot.
///
/// # Errors
///
/// Propagates enumeration failures and rejects empty display lists.
pub fn load_geometry(enumerator: &dyn ScreenEnumerator) -> Result<ScreenGeometry, ScreenInfoError> {
    let displays = enumerator.enumerate_displays()?;
    Ok(ScreenGeometry::new(displays)?)
}

/// A screen enumerator that always returns the same display list.
#[derive(Debug, Clone)]
pub struct StaticScreenEnumerator {
    pub displays: Vec<DisplayBounds>,
}

impl StaticScreenEnumerator {
    /// A single 1920x1080 primary display.
    pub fn single_1080p() -> Self {
        Self {
            displays: vec![DisplayBounds::primary(1920, 1080)],
        }
    }
}

impl ScreenEnumerator for StaticScreenEnumerator {
    fn enumerate_displays(&self) -> Result<Vec<DisplayBounds>, ScreenInfoError> {
        Ok(self.displays.clone())
    }
}
