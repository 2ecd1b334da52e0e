//! Contract shared by the harness and the guest runner.

/// Line written to the debug console right before the payload starts.
pub const PAYLOAD_START_MARKER: &str = "## guestrun: payload start ##";

/// Line written to the debug console right after the payload exits.
pub const PAYLOAD_END_MARKER: &str = "## guestrun: payload end ##";

/// Guest path of the argument manifest: the executable name on the first
/// line, one argument per following line.
pub const MANIFEST_PATH: &str = "/etc/guestrun";

/// Guest path the runner binary is installed at.
pub const RUNNER_PATH: &str = "/usr/bin/guestrund";

/// Bochs-compatible debug console port.
pub const DEBUG_CONSOLE_PORT: u16 = 0xe9;

/// Port of the `isa-debug-exit` device.
pub const DEBUG_EXIT_PORT: u16 = 0x501;

/// ACPI power-off port and value, used when no debug-exit device is present.
pub const ACPI_SHUTDOWN_PORT: u16 = 0x604;
pub const ACPI_SHUTDOWN_VALUE: u16 = 0x2000;

/// The debug-exit device terminates the emulator with `(value << 1) | 1`.
pub const DEBUG_EXIT_FACTOR: i32 = 2;

/// Largest value whose encoded emulator status still fits in a process
/// exit code.
pub const MAX_EXIT_VALUE: u8 = 127;

/// Reported when the payload could not be started or was killed by a signal.
pub const LAUNCH_FAILURE_CODE: u8 = MAX_EXIT_VALUE;

/// Value written to the debug-exit port for a payload that finished with
/// `code` (`None` when it was terminated by a signal).
///
/// Codes above [`MAX_EXIT_VALUE`] saturate.
#[must_use]
pub fn exit_value(code: Option<i32>) -> u8 {
    match code {
        Some(code) => u8::try_from(code.clamp(0, i32::from(MAX_EXIT_VALUE)))
            .unwrap_or(LAUNCH_FAILURE_CODE),
        None => LAUNCH_FAILURE_CODE,
    }
}

/// Emulator exit status produced by writing `value` to the debug-exit port.
#[must_use]
pub fn emulator_status(value: u8) -> i32 {
    i32::from(value) * DEBUG_EXIT_FACTOR + 1
}
