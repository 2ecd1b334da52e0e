//! FUSE mount backend and `/proc/mounts` reader.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, Result};
use proc_mounts::MountIter;

use crate::application::ports::{DaemonHandle, MountBackend, MountTable};
use crate::domain::config::MountConfig;
use crate::domain::mount_table::MountEntry;

/// Kernel mount table on Linux.
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Running `redoxfs` (or compatible) daemon.
///
/// Killed if dropped before the mount is released.
pub struct FuseDaemon {
    child: tokio::process::Child,
}

impl DaemonHandle for FuseDaemon {
    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child
            .try_wait()
            .context("failed to poll mount daemon")
    }

    fn kill(&mut self) -> Result<()> {
        self.child.start_kill().context("failed to kill mount daemon")
    }
}

/// Mounts images with an external FUSE daemon and releases them with
/// `fusermount -u`.
pub struct FuseMountBackend {
    daemon: String,
    unmount: String,
}

impl FuseMountBackend {
    #[must_use]
    pub fn new(config: &MountConfig) -> Self {
        Self {
            daemon: config.daemon.clone(),
            unmount: config.unmount.clone(),
        }
    }
}

impl MountBackend for FuseMountBackend {
    type Daemon = FuseDaemon;

    fn spawn_daemon(&self, image: &Path, dir: &Path) -> Result<FuseDaemon> {
        tracing::debug!(daemon = %self.daemon, image = %image.display(), dir = %dir.display(), "spawning mount daemon");
        let child = tokio::process::Command::new(&self.daemon)
            .arg(image)
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.daemon))?;
        Ok(FuseDaemon { child })
    }

    fn request_unmount(&self, dir: &Path) -> Result<()> {
        tracing::debug!(tool = %self.unmount, dir = %dir.display(), "requesting unmount");
        let output = std::process::Command::new(&self.unmount)
            .arg("-u")
            .arg(dir)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.unmount))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} -u {} failed: {}",
                self.unmount,
                dir.display(),
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// Reads mount entries from a mount-table file (`/proc/mounts` by default).
pub struct ProcMountTable {
    path: PathBuf,
}

impl ProcMountTable {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcMountTable {
    fn default() -> Self {
        Self::new(PROC_MOUNTS)
    }
}

impl MountTable for ProcMountTable {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        let mounts = MountIter::new_from_file(&self.path)
            .with_context(|| format!("cannot read {}", self.path.display()))?;
        mounts
            .map(|mount| {
                let mount =
                    mount.with_context(|| format!("cannot parse {}", self.path.display()))?;
                Ok(MountEntry {
                    source: mount.source.display().to_string(),
                    target: mount.dest,
                    fs_type: mount.fstype,
                })
            })
            .collect()
    }
}
