//! Debug devices the runner reports through.
//!
//! On Redox the runner talks to the emulator's port devices directly. On
//! other systems the debug console is stderr and power-off is a plain
//! process exit, which keeps the runner usable on the host.

#[cfg(target_os = "redox")]
pub use self::redox::{DebugConsole, init, power_off};

#[cfg(not(target_os = "redox"))]
pub use self::host::{DebugConsole, init, power_off};

#[cfg(target_os = "redox")]
#[allow(unsafe_code)]
mod redox {
    use std::io::{self, Write};

    use syscall::{Io, Pio, ProcSchemeVerb};

    use crate::protocol::{
        ACPI_SHUTDOWN_PORT, ACPI_SHUTDOWN_VALUE, DEBUG_CONSOLE_PORT, DEBUG_EXIT_PORT,
    };

    unsafe extern "C" {
        fn redox_cur_thrfd_v0() -> usize;

        fn redox_sys_call_v0(
            fd: usize,
            payload: *mut u8,
            payload_len: usize,
            flags: usize,
            metadata: *const u64,
            metadata_len: usize,
        ) -> usize;
    }

    fn syscall_error(error: syscall::Error) -> io::Error {
        io::Error::from_raw_os_error(error.errno)
    }

    /// Acquire port I/O rights for the current thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel refuses the request.
    pub fn init() -> io::Result<()> {
        // SAFETY: takes no arguments and returns a descriptor owned by the thread.
        let thread_fd = unsafe { redox_cur_thrfd_v0() };
        let kernel_fd = syscall::dup(thread_fd, b"open_via_dup").map_err(syscall_error)?;
        let mut payload = [0u8; 0];
        let metadata = [ProcSchemeVerb::Iopl as u64];
        // SAFETY: both buffers outlive the call and their lengths match.
        let raw = unsafe {
            redox_sys_call_v0(
                kernel_fd,
                payload.as_mut_ptr(),
                payload.len(),
                0,
                metadata.as_ptr(),
                metadata.len(),
            )
        };
        let _ = syscall::close(kernel_fd);
        libredox::error::Error::demux(raw)?;
        Ok(())
    }

    /// Bochs-compatible debug console, one port write per byte.
    pub struct DebugConsole {
        port: Pio<u8>,
    }

    impl DebugConsole {
        #[must_use]
        pub fn new() -> Self {
            Self {
                port: Pio::new(DEBUG_CONSOLE_PORT),
            }
        }
    }

    impl Default for DebugConsole {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Write for DebugConsole {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            for byte in buf {
                self.port.write(*byte);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Terminate the emulator, reporting `value` through debug-exit.
    pub fn power_off(value: u8) -> ! {
        Pio::<u8>::new(DEBUG_EXIT_PORT).write(value);
        Pio::<u16>::new(ACPI_SHUTDOWN_PORT).write(ACPI_SHUTDOWN_VALUE);
        std::process::exit(i32::from(value))
    }
}

#[cfg(not(target_os = "redox"))]
mod host {
    use std::io::{self, Write};

    pub fn init() -> io::Result<()> {
        Ok(())
    }

    /// Stand-in debug console writing to stderr.
    pub struct DebugConsole {
        inner: io::Stderr,
    }

    impl DebugConsole {
        #[must_use]
        pub fn new() -> Self {
            Self {
                inner: io::stderr(),
            }
        }
    }

    impl Default for DebugConsole {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Write for DebugConsole {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    pub fn power_off(value: u8) -> ! {
        std::process::exit(i32::from(value))
    }
}
