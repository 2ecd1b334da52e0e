//! Guest-side runner for guestrun.
//!
//! Boots as the last init script of the guest image, reads the argument
//! manifest the harness injected, runs the payload and reports back through
//! the emulator's debug devices: output is mirrored to the debug console
//! between the payload markers and the exit code leaves through
//! `isa-debug-exit`.

pub mod invocation;
pub mod platform;
pub mod protocol;
pub mod relay;

pub use invocation::{Invocation, InvocationError};
pub use relay::relay;
