//! QEMU implementation of the `Emulator` port.

use anyhow::Result;

use crate::application::ports::{CommandRunner, Emulator};

/// Launches the configured `qemu-system-*` binary with the terminal attached.
pub struct QemuEmulator<R: CommandRunner> {
    runner: R,
    binary: String,
}

impl<R: CommandRunner> QemuEmulator<R> {
    #[must_use]
    pub fn new(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }
}

impl<R: CommandRunner> Emulator for QemuEmulator<R> {
    async fn run(&self, args: &[String]) -> Result<Option<i32>> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = self.runner.run_status(&self.binary, &args).await?;
        Ok(status.code())
    }
}
