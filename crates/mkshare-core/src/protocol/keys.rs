//! Platform-independent key identifiers carried in key events.
//!
//! Keys travel on the wire as USB HID Usage IDs (page 0x07).  Capture
//! adapters translate their native codes into [`KeyCode`] before the event
//! reaches the router, and injection adapters translate back.

use serde::{Deserialize, Serialize};

/// A USB HID keyboard usage id.
///
/// Unlike a closed enum, a newtype keeps unknown usages intact so a newer
/// peer can forward keys this build has no name for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const A: KeyCode = KeyCode(0x04);
    pub const Z: KeyCode = KeyCode(0x1D);
    pub const ENTER: KeyCode = KeyCode(0x28);
    pub const ESCAPE: KeyCode = KeyCode(0x29);
    pub const BACKSPACE: KeyCode = KeyCode(0x2A);
    pub const TAB: KeyCode = KeyCode(0x2B);
    pub const SPACE: KeyCode = KeyCode(0x2C);
    pub const F1: KeyCode = KeyCode(0x3A);
    pub const F12: KeyCode = KeyCode(0x45);
    pub const PRINT_SCREEN: KeyCode = KeyCode(0x46);
    pub const SCROLL_LOCK: KeyCode = KeyCode(0x47);
    pub const PAUSE: KeyCode = KeyCode(0x48);
    pub const LEFT_CTRL: KeyCode = KeyCode(0xE0);
    pub const LEFT_SHIFT: KeyCode = KeyCode(0xE1);
    pub const LEFT_ALT: KeyCode = KeyCode(0xE2);
    pub const LEFT_META: KeyCode = KeyCode(0xE3);
    pub const RIGHT_CTRL: KeyCode = KeyCode(0xE4);
    pub const RIGHT_SHIFT: KeyCode = KeyCode(0xE5);
    pub const RIGHT_ALT: KeyCode = KeyCode(0xE6);
    pub const RIGHT_META: KeyCode = KeyCode(0xE7);

    /// Resolves a configuration-friendly key name (case-insensitive).
    ///
    /// Accepts the named keys above, single letters `a`..`z`, `f1`..`f12`,
    /// and raw usages written as `0x29`.
    pub fn from_name(name: &str) -> Option<KeyCode> {
        let lower = name.trim().to_ascii_lowercase();
        let named = match lower.as_str() {
            "escape" | "esc" => Some(KeyCode::ESCAPE),
            "enter" | "return" => Some(KeyCode::ENTER),
            "backspace" => Some(KeyCode::BACKSPACE),
            "tab" => Some(KeyCode::TAB),
            "space" => Some(KeyCode::SPACE),
            "printscreen" | "print_screen" => Some(KeyCode::PRINT_SCREEN),
            "scrolllock" | "scroll_lock" => Some(KeyCode::SCROLL_LOCK),
            "pause" => Some(KeyCode::PAUSE),
            _ => None,
        };
        if named.is_some() {
            return named;
        }

        if let Some(hex) = lower.strip_prefix("0x") {
            return u16::from_str_radix(hex, 16).ok().map(KeyCode);
        }

        let bytes = lower.as_bytes();
        if bytes.len() == 1 && bytes[0].is_ascii_lowercase() {
            return Some(KeyCode(KeyCode::A.0 + u16::from(bytes[0] - b'a')));
        }

        // F1..F12 are contiguous usages
        let n: u16 = lower.strip_prefix('f')?.parse().ok()?;
        (1..=12).contains(&n).then(|| KeyCode(KeyCode::F1.0 + n - 1))
    }

    /// Returns `true` for the eight modifier usages (0xE0..=0xE7).
    pub fn is_modifier(self) -> bool {
        (0xE0..=0xE7).contains(&self.0)
    }
}

/// Modifier key bitmask sent alongside every key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers(pub u8);

impl Modifiers {
    pub const SHIFT: u8 = 0x01;
    pub const CTRL: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const META: u8 = 0x08;
    pub const CAPS: u8 = 0x10;

    /// Returns `true` if every bit in `mask` is set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }
}
