//! Guest exit status recovered from the emulator's debug-exit side channel.
//!
//! QEMU's `isa-debug-exit` device terminates the emulator with
//! `(value << 1) | 1`, so the guest's own code is the raw status divided by
//! [`DEBUG_EXIT_FACTOR`]. A guest that powers off cleanly makes the emulator
//! exit 0, which decodes to 0 as well.

use serde::Serialize;

pub use guestrund::protocol::DEBUG_EXIT_FACTOR;

/// Process exit code used when the guest result is indeterminate.
pub const INDETERMINATE_EXIT_CODE: i32 = 125;

/// Decoded guest status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum GuestStatus {
    /// The guest reported this exit code.
    Exited(i32),
    /// The emulator died without going through the debug-exit convention.
    Indeterminate,
}

impl GuestStatus {
    /// Numeric sentinel for [`GuestStatus::Indeterminate`]; outside 0–255.
    pub const SENTINEL: i32 = -1;

    /// The decoded code, or [`Self::SENTINEL`].
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Indeterminate => Self::SENTINEL,
        }
    }

    /// Exit code the harness process should terminate with.
    #[must_use]
    pub fn process_exit_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Indeterminate => INDETERMINATE_EXIT_CODE,
        }
    }
}

/// Decode the emulator's raw termination status.
///
/// `raw` is the exit code as reported by the OS, or `None` when the emulator
/// was killed by a signal.
#[must_use]
pub fn decode_exit_status(raw: Option<i32>) -> GuestStatus {
    match raw {
        Some(code) => GuestStatus::Exited(code / DEBUG_EXIT_FACTOR),
        None => GuestStatus::Indeterminate,
    }
}
