//! Mock platform input emulator for tests and headless runs.
//!
//! The real emulators make OS API calls that need a desktop session and
//! actually move the cursor or press keys on the machine running the tests.
//! [`MockInputEmulator`] replaces all of that with in-memory recording: each
//! emitted event is pushed onto one ordered log, so assertions can check
//! exactly what was emitted and in what order.
//!
//! # Usage in tests
//!
//! ```ignore
//! let emulator = Arc::new(MockInputEmulator::new());
//! let mut use_case = EmulateInputUseCase::new(emulator.clone(), geometry);
//!
//! use_case.handle(1, 0, &to_remote).unwrap();
//!
//! assert_eq!(emulator.emitted(), vec![EmittedInput::MoveAbsolute(1, 540)]);
//! ```
//!
//! Build with [`MockInputEmulator::failing`] to exercise error paths.

use std::sync::{Mutex, PoisonError};

use mkshare_core::protocol::{KeyCode, Modifiers, MouseButton, PressState};

use crate::application::emulate_input::{EmulationError, PlatformInputEmulator};

/// One recorded emulator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmittedInput {
    Key(KeyCode, PressState),
    Button(MouseButton, PressState),
    Scroll(i32, i32),
    MoveRelative(i32, i32),
    MoveAbsolute(i32, i32),
}

/// A mock emulator that records all calls without performing OS API calls.
#[derive(Debug, Default)]
pub struct MockInputEmulator {
    log: Mutex<Vec<EmittedInput>>,
    should_fail: bool,
}

impl MockInputEmulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An emulator whose every call fails with [`EmulationError::Platform`].
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Every call recorded so far, in order.
    pub fn emitted(&self) -> Vec<EmittedInput> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EmittedInput>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, input: EmittedInput) -> Result<(), EmulationError> {
        if self.should_fail {
            return Err(EmulationError::Platform("mock failure".into()));
        }
        self.lock().push(input);
        Ok(())
    }
}

impl PlatformInputEmulator for MockInputEmulator {
    fn emit_key(
        &self,
        key: KeyCode,
        state: PressState,
        _modifiers: Modifiers,
    ) -> Result<(), EmulationError> {
        self.record(EmittedInput::Key(key, state))
    }

    fn emit_mouse_button(
        &self,
        button: MouseButton,
        state: PressState,
    ) -> Result<(), EmulationError> {
        self.record(EmittedInput::Button(button, state))
    }

    fn emit_scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.record(EmittedInput::Scroll(dx, dy))
    }

    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.record(EmittedInput::MoveRelative(dx, dy))
    }

    fn move_absolute(&self, x: i32, y: i32) -> Result<(), EmulationError> {
        self.record(EmittedInput::MoveAbsolute(x, y))
    }
}
