//! Application service — payload injection into a mounted guest filesystem.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use guestrund::protocol::RUNNER_PATH;

use crate::application::ports::{CommandRunner, ProgressReporter};
use crate::domain::config::GuestConfig;
use crate::domain::error::RunError;
use crate::domain::payload::{GuestPayload, render_manifest};

/// Mode the payload is installed with inside the guest.
const EXECUTABLE_MODE: u32 = 0o755;

/// Copies the guest runner, the payload, its companion folder and the
/// argument manifest into a guest root tree.
pub struct PayloadInjector<'a, R: CommandRunner, P: ProgressReporter> {
    runner: &'a R,
    reporter: &'a P,
    guest: &'a GuestConfig,
}

impl<'a, R: CommandRunner, P: ProgressReporter> PayloadInjector<'a, R, P> {
    #[must_use]
    pub fn new(runner: &'a R, reporter: &'a P, guest: &'a GuestConfig) -> Self {
        Self {
            runner,
            reporter,
            guest,
        }
    }

    /// Inject `payload` under the guest root at `root`.
    ///
    /// The configured guest runner is installed first; without one the
    /// image must already provide it.
    ///
    /// # Errors
    ///
    /// Returns `RunError::RunnerNotFound` or `RunError::PayloadNotFound` if
    /// the runner or the executable is not a file, or an I/O error naming
    /// the path or program that failed.
    pub async fn inject(&self, root: &Path, payload: &GuestPayload) -> Result<()> {
        if let Some(runner) = &self.guest.runner {
            if !is_file(runner).await {
                return Err(RunError::RunnerNotFound(runner.clone()).into());
            }
            let dest = root.join(RUNNER_PATH.trim_start_matches('/'));
            install_executable(runner, &dest).await?;
            tracing::debug!(dest = %dest.display(), "runner installed");
        }

        let executable = payload.executable();
        if !is_file(executable).await {
            return Err(RunError::PayloadNotFound(executable.to_path_buf()).into());
        }
        let dest = root.join(&self.guest.bin_dir).join(payload.guest_name());
        install_executable(executable, &dest).await?;
        tracing::debug!(dest = %dest.display(), "payload installed");

        let host_folder = match payload.folder() {
            Some(folder) => Some(self.copy_folder(root, folder).await?),
            None => None,
        };

        let manifest = render_manifest(
            payload,
            host_folder.as_deref().map(|p| p.to_string_lossy()).as_deref(),
            &self.guest.folder_dest,
        );
        for rewrite in &manifest.rewrites {
            tracing::info!(host = %rewrite.host, guest = %rewrite.guest, "rewrote argument");
            self.reporter
                .step(&format!("replacing '{}' with '{}' in arguments", rewrite.host, rewrite.guest));
        }

        let manifest_path = root.join(&self.guest.manifest_path);
        if let Some(parent) = manifest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&manifest_path, manifest.text)
            .await
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;
        Ok(())
    }

    /// Copy the contents of `folder` into the guest folder destination.
    /// Returns the canonical host path of `folder`.
    async fn copy_folder(&self, root: &Path, folder: &Path) -> Result<PathBuf> {
        let canonical = tokio::fs::canonicalize(folder)
            .await
            .with_context(|| format!("failed to resolve {}", folder.display()))?;
        let dest = root.join(self.guest.folder_dest.trim_start_matches('/'));
        tokio::fs::create_dir_all(&dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;

        self.reporter.step(&format!(
            "copying '{}' to '{}'",
            canonical.display(),
            self.guest.folder_dest
        ));
        // Trailing slash: copy the folder's contents, not the folder itself.
        let source = format!("{}/", canonical.display());
        let dest_arg = dest.to_string_lossy();
        let output = self
            .runner
            .run_with_timeout(
                "rsync",
                &["--archive", &source, &dest_arg],
                self.guest.copy_timeout(),
            )
            .await
            .context("failed to run rsync")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("rsync failed for {}: {}", canonical.display(), stderr.trim());
        }
        Ok(canonical)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Copy `source` to `dest`, creating parent directories, and mark it
/// executable.
async fn install_executable(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::copy(source, dest)
        .await
        .with_context(|| format!("failed to copy {} to {}", source.display(), dest.display()))?;
    set_executable(dest).await
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(EXECUTABLE_MODE))
        .await
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
