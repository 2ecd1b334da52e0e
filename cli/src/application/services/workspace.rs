//! Application service — per-run workspace lifecycle.
//!
//! A `Workspace` owns the working image copy, mount directory and log file
//! of a single run. `teardown` releases them exactly once; a workspace
//! dropped without teardown (panic unwinding) falls back to a synchronous
//! best-effort release.
//!
//! Mount-populated runs write into the mounted working image. Archive
//! runs unpack the base archive into the mount directory, used as a plain
//! staging tree, and build the working image from it.

use std::path::Path;

use anyhow::{Context, Result};

use crate::application::ports::{
    Archiver, CommandRunner, FsFormatter, Installer, MountBackend, MountTable, ProgressReporter,
};
use crate::application::services::fs_ops::{
    remove_dir_all_if_exists, remove_empty_dir_blocking, remove_empty_dir_if_exists,
    remove_file_blocking, remove_file_if_exists,
};
use crate::application::services::image_catalog::ImageCatalog;
use crate::application::services::mount_controller::MountController;
use crate::application::services::payload::PayloadInjector;
use crate::domain::image::BaseImage;
use crate::domain::payload::GuestPayload;
use crate::domain::workspace::{RunId, WorkspacePaths};

pub struct Workspace<'m, B: MountBackend, T: MountTable> {
    paths: WorkspacePaths,
    mounts: &'m MountController<B, T>,
    released: bool,
}

impl<'m, B: MountBackend, T: MountTable> Workspace<'m, B, T> {
    /// Allocate a fresh workspace under `run_root`.
    ///
    /// Leftovers at the derived paths are purged first, unmounting the mount
    /// directory if a previous run left it mounted.
    ///
    /// # Errors
    ///
    /// Returns an error if leftovers cannot be released or the mount
    /// directory cannot be created.
    pub async fn create(run_root: &Path, mounts: &'m MountController<B, T>) -> Result<Self> {
        let paths = WorkspacePaths::derive(run_root, &RunId::generate());
        tracing::info!(run_id = %paths.run_id, "creating workspace");

        mounts.unmount(&paths.mount_dir).await?;
        remove_file_if_exists(&paths.working_image).await?;
        remove_file_if_exists(&paths.log).await?;
        remove_dir_all_if_exists(&paths.mount_dir).await?;

        tokio::fs::create_dir_all(run_root)
            .await
            .with_context(|| format!("failed to create {}", run_root.display()))?;
        tokio::fs::create_dir(&paths.mount_dir)
            .await
            .with_context(|| format!("failed to create {}", paths.mount_dir.display()))?;

        Ok(Self {
            paths,
            mounts,
            released: false,
        })
    }

    #[must_use]
    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    /// Copy the base image, mount it, inject the payload and unmount again.
    ///
    /// The unmount is attempted even when injection fails; the injection
    /// error is returned in that case.
    ///
    /// # Errors
    ///
    /// Returns the first failure among copy, mount, injection and unmount.
    pub async fn populate<R: CommandRunner, P: ProgressReporter>(
        &self,
        base: &BaseImage,
        payload: &GuestPayload,
        injector: &PayloadInjector<'_, R, P>,
    ) -> Result<()> {
        let image = &self.paths.working_image;
        let dir = &self.paths.mount_dir;

        tokio::fs::copy(&base.image, image).await.with_context(|| {
            format!("failed to copy {} to {}", base.image.display(), image.display())
        })?;
        self.mounts.mount(image, dir).await?;

        let injected = injector.inject(dir, payload).await;
        let unmounted = self.mounts.unmount(dir).await;
        match (injected, unmounted) {
            (Err(e), Err(unmount)) => {
                tracing::warn!(error = %format!("{unmount:#}"), "unmount after failed injection");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), unmounted) => unmounted,
        }
    }

    /// Unpack the archived `base` into the staging tree, inject the payload
    /// and build the working image from the tree.
    ///
    /// The staging tree is emptied afterwards whether or not the build
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first failure among unpacking, injection and image
    /// creation, or the cleanup failure if those succeeded.
    pub async fn assemble<I, F, A, R, P>(
        &self,
        base: &BaseImage,
        payload: &GuestPayload,
        injector: &PayloadInjector<'_, R, P>,
        catalog: &ImageCatalog<I, F, A>,
    ) -> Result<()>
    where
        I: Installer,
        F: FsFormatter,
        A: Archiver,
        R: CommandRunner,
        P: ProgressReporter,
    {
        let tree = &self.paths.mount_dir;
        let built = async {
            catalog.unpack_base(base, tree).await?;
            injector.inject(tree, payload).await?;
            catalog
                .image_from_tree(base, tree, &self.paths.working_image)
                .await
        }
        .await;

        let cleared = async {
            remove_dir_all_if_exists(tree).await?;
            tokio::fs::create_dir(tree)
                .await
                .with_context(|| format!("failed to create {}", tree.display()))
        }
        .await;
        match (built, cleared) {
            (Err(e), Err(clear)) => {
                tracing::warn!(error = %format!("{clear:#}"), "clearing staging tree");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), cleared) => cleared,
        }
    }

    /// Release every resource of this workspace. Runs at most once.
    ///
    /// # Errors
    ///
    /// Returns `MountError::UnmountFailure` if the mount directory is still
    /// mounted; the working image and mount directory are kept in that case.
    pub async fn teardown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        tracing::info!(run_id = %self.paths.run_id, "tearing down workspace");

        let unmounted = self.mounts.unmount(&self.paths.mount_dir).await;
        let log = remove_file_if_exists(&self.paths.log).await;
        unmounted?;

        let image = remove_file_if_exists(&self.paths.working_image).await;
        let dir = remove_empty_dir_if_exists(&self.paths.mount_dir).await;
        log.and(image).and(dir)
    }

    fn teardown_blocking(&self) -> Result<()> {
        let unmounted = self.mounts.unmount_blocking(&self.paths.mount_dir);
        let log = remove_file_blocking(&self.paths.log);
        unmounted?;
        log?;
        remove_file_blocking(&self.paths.working_image)?;
        remove_empty_dir_blocking(&self.paths.mount_dir)
    }
}

impl<B: MountBackend, T: MountTable> Drop for Workspace<'_, B, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        tracing::error!(run_id = %self.paths.run_id, "workspace dropped without teardown");
        if let Err(e) = self.teardown_blocking() {
            tracing::error!(
                run_id = %self.paths.run_id,
                error = %format!("{e:#}"),
                "fallback teardown failed"
            );
        }
    }
}
