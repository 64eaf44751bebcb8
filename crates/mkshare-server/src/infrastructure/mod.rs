//! Infrastructure layer for the controller.
//!
//! Contains OS-facing adapters: input capture hooks, the cursor, the TCP
//! listener, and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mkshare_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.

pub mod cursor;
pub mod input_capture;
pub mod network;
pub mod storage;
