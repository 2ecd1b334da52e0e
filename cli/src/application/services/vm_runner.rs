//! Application service — boots the guest and decodes its exit status.

use anyhow::{Context, Result};

use crate::application::ports::Emulator;
use crate::domain::exit_status::{GuestStatus, decode_exit_status};
use crate::domain::vm_profile::VmProfile;
use crate::domain::workspace::WorkspacePaths;

pub struct VmRunner<'a, E: Emulator> {
    emulator: &'a E,
    profile: &'a VmProfile,
}

impl<'a, E: Emulator> VmRunner<'a, E> {
    #[must_use]
    pub fn new(emulator: &'a E, profile: &'a VmProfile) -> Self {
        Self { emulator, profile }
    }

    /// Boot the workspace image and block until the emulator exits.
    ///
    /// No timeout applies; the guest is expected to terminate itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the emulator cannot be started.
    pub async fn run(&self, paths: &WorkspacePaths) -> Result<GuestStatus> {
        let args = self.profile.emulator_args(&paths.working_image, &paths.log);
        tracing::info!(run_id = %paths.run_id, kvm = self.profile.kvm, "booting guest");
        tracing::debug!(?args, "emulator arguments");

        let raw = self
            .emulator
            .run(&args)
            .await
            .context("failed to run emulator")?;
        let status = decode_exit_status(raw);
        tracing::info!(?raw, ?status, "emulator exited");
        Ok(status)
    }
}
