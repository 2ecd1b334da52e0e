//! Application service — the end-to-end guest run pipeline.
//!
//! Imports only from `crate::domain` and `crate::application`.
//! All I/O is routed through injected port traits and the services built
//! on them.

use std::future::Future;
use std::path::Path;

use anyhow::Result;
use thiserror::Error;

use crate::application::ports::{
    Archiver, CommandRunner, Emulator, FsFormatter, Installer, MountBackend, MountTable,
    ProgressReporter,
};
use crate::application::services::image_catalog::ImageCatalog;
use crate::application::services::mount_controller::MountController;
use crate::application::services::payload::PayloadInjector;
use crate::application::services::result_reporter::{self, RunResult};
use crate::application::services::vm_runner::VmRunner;
use crate::application::services::workspace::Workspace;
use crate::domain::config::GuestConfig;
use crate::domain::error::RunError;
use crate::domain::image::{BaseImage, ImageFlavor, Population};
use crate::domain::payload::GuestPayload;
use crate::domain::vm_profile::VmProfile;

/// The guest finished but its workspace could not be released.
///
/// Carries the finished run so its output still reaches the caller.
#[derive(Debug, Error)]
#[error("guest finished but its workspace could not be torn down: {teardown:#}")]
pub struct TeardownFailed {
    pub result: RunResult,
    pub teardown: anyhow::Error,
}

/// Collaborators of a guest run.
pub struct GuestRun<'a, I, F, A, B, T, E, R, P>
where
    I: Installer,
    F: FsFormatter,
    A: Archiver,
    B: MountBackend,
    T: MountTable,
    E: Emulator,
    R: CommandRunner,
    P: ProgressReporter,
{
    pub catalog: &'a ImageCatalog<I, F, A>,
    pub mounts: &'a MountController<B, T>,
    pub emulator: &'a E,
    pub runner: &'a R,
    pub reporter: &'a P,
    pub profile: &'a VmProfile,
    pub guest: &'a GuestConfig,
    /// Directory per-run workspaces are created in.
    pub run_root: &'a Path,
}

impl<I, F, A, B, T, E, R, P> GuestRun<'_, I, F, A, B, T, E, R, P>
where
    I: Installer,
    F: FsFormatter,
    A: Archiver,
    B: MountBackend,
    T: MountTable,
    E: Emulator,
    R: CommandRunner,
    P: ProgressReporter,
{
    /// Run `payload` in a fresh guest booted from the `flavor` base image.
    ///
    /// The pipeline races `interrupt`; when it fires first the pipeline is
    /// cancelled (killing the emulator) and `RunError::Interrupted` is
    /// returned. The workspace is torn down on every path once it exists.
    /// A pipeline error takes precedence over a teardown error.
    ///
    /// # Errors
    ///
    /// Returns the first failure of image preparation, workspace setup,
    /// population or the emulator run. A teardown failure after a finished
    /// run is returned as [`TeardownFailed`] holding the run's result.
    pub async fn run_guest(
        &self,
        payload: &GuestPayload,
        flavor: ImageFlavor,
        interrupt: impl Future<Output = ()>,
    ) -> Result<RunResult> {
        tokio::pin!(interrupt);

        let base = tokio::select! {
            base = self.catalog.ensure_base_image(flavor, self.mounts, self.reporter) => base?,
            () = &mut interrupt => {
                if let Err(e) = self.catalog.discard_partial(flavor, self.mounts).await {
                    tracing::warn!(error = %format!("{e:#}"), "failed to discard partial image");
                }
                return Err(RunError::Interrupted.into());
            }
        };

        let mut workspace = Workspace::create(self.run_root, self.mounts).await?;
        self.reporter
            .step(&format!("preparing workspace {}", workspace.paths().run_id));

        let outcome = tokio::select! {
            result = self.pipeline(&workspace, &base, payload) => result,
            () = &mut interrupt => {
                tracing::warn!(run_id = %workspace.paths().run_id, "interrupted");
                Err(RunError::Interrupted.into())
            }
        };
        let teardown = workspace.teardown().await;

        match (outcome, teardown) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(result), Err(teardown)) => Err(TeardownFailed { result, teardown }.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => Err(e.context(format!("teardown also failed: {teardown:#}"))),
        }
    }

    async fn pipeline(
        &self,
        workspace: &Workspace<'_, B, T>,
        base: &BaseImage,
        payload: &GuestPayload,
    ) -> Result<RunResult> {
        let injector = PayloadInjector::new(self.runner, self.reporter, self.guest);
        match base.population {
            Population::Mount => workspace.populate(base, payload, &injector).await?,
            Population::Archive => {
                workspace
                    .assemble(base, payload, &injector, self.catalog)
                    .await?;
            }
        }
        self.reporter
            .success(&format!("booting guest with {}", payload.guest_name()));

        let status = VmRunner::new(self.emulator, self.profile)
            .run(workspace.paths())
            .await?;
        result_reporter::report(workspace.paths(), status).await
    }
}
