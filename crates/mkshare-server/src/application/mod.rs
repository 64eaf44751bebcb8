//! Application layer use cases for the controller.
//!
//! Use cases in this layer orchestrate domain objects and depend only on
//! traits, so the infrastructure can be swapped without changing this code.
//! They contain no OS calls and no direct network I/O.
//!
//! # Sub-modules
//!
//! - **`route_input`** – The outbound event router.  Owns the ownership
//!   machine, hands control to the peer after an edge dwell, takes it back
//!   on the recall key, and forwards captured input while the peer owns it.
//!   It runs on every keystroke and mouse movement.
//!
//! - **`sample_pointer`** – Polls the cursor position on a fixed interval so
//!   a resting cursor still accrues dwell time.

pub mod route_input;
pub mod sample_pointer;
