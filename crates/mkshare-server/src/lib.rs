//! mkshare-server library entry point.
//!
//! The controller side of MKShare: captures local input, decides when the
//! controlled peer owns it, and streams it over the session link.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;
