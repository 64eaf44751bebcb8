//! Input emulation adapters.
//!
//! Only the recording [`mock::MockInputEmulator`] ships in this build; an OS
//! backend plugs in by implementing
//! [`PlatformInputEmulator`](crate::application::emulate_input::PlatformInputEmulator).

pub mod mock;
