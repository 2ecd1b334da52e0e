//! Application service — loopback mount state machine.
//!
//! Owns every `MountState` transition for one (image, directory) pair at a
//! time. The daemon and the host mount table are reached only through the
//! `MountBackend` and `MountTable` ports.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;

use crate::application::ports::{DaemonHandle, MountBackend, MountTable};
use crate::domain::MountState;
use crate::domain::config::MountConfig;
use crate::domain::error::MountError;

/// Bounded polling used while waiting for a mount to appear or disappear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&MountConfig> for PollPolicy {
    fn from(config: &MountConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }
}

pub struct MountController<B: MountBackend, T: MountTable> {
    backend: B,
    table: T,
    fs_type: String,
    policy: PollPolicy,
    state: Mutex<MountState>,
    daemon: Mutex<Option<B::Daemon>>,
}

impl<B: MountBackend, T: MountTable> MountController<B, T> {
    #[must_use]
    pub fn new(backend: B, table: T, fs_type: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            backend,
            table,
            fs_type: fs_type.into(),
            policy,
            state: Mutex::new(MountState::Unmounted),
            daemon: Mutex::new(None),
        }
    }

    /// Current state of the controller.
    #[must_use]
    pub fn state(&self) -> MountState {
        *lock(&self.state)
    }

    fn set_state(&self, state: MountState) {
        tracing::debug!(?state, "mount state transition");
        *lock(&self.state) = state;
    }

    /// `true` if `dir` currently appears in the host mount table with the
    /// configured filesystem type.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount table cannot be read.
    pub fn is_mounted(&self, dir: &Path) -> Result<bool> {
        let Some(target) = canonical_target(dir)? else {
            return Ok(false);
        };
        let entries = self.table.entries().context("failed to read mount table")?;
        Ok(entries.iter().any(|e| e.matches(&self.fs_type, &target)))
    }

    /// Mount `image` at `dir` and wait until the mount is visible.
    ///
    /// Any existing mount at `dir` is removed first.
    ///
    /// # Errors
    ///
    /// Returns `MountError::MountFailure` if the daemon exits early or the
    /// mount does not appear before the deadline, or the error from the
    /// defensive unmount if `dir` could not be released.
    pub async fn mount(&self, image: &Path, dir: &Path) -> Result<()> {
        self.unmount(dir)
            .await
            .with_context(|| format!("failed to release {} before mounting", dir.display()))?;

        tracing::info!(image = %image.display(), dir = %dir.display(), "mounting");
        let mut daemon = match self.backend.spawn_daemon(image, dir) {
            Ok(daemon) => daemon,
            Err(e) => {
                self.set_state(MountState::Failed);
                return Err(e.context(mount_failure(image, dir, "daemon could not be started")));
            }
        };
        self.set_state(MountState::Mounting);

        let deadline = Instant::now() + self.policy.timeout;
        loop {
            match self.is_mounted(dir) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    self.abandon(&mut daemon, dir);
                    return Err(e);
                }
            }

            match daemon.try_wait() {
                Ok(Some(status)) => {
                    self.release_failed(dir);
                    let reason = format!("daemon exited ({status}) before the mount appeared");
                    return Err(mount_failure(image, dir, &reason).into());
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "daemon liveness check failed"),
            }

            if Instant::now() >= deadline {
                self.abandon(&mut daemon, dir);
                let reason = format!("timed out after {}s", self.policy.timeout.as_secs());
                return Err(mount_failure(image, dir, &reason).into());
            }

            tracing::debug!(dir = %dir.display(), "waiting for mount");
            tokio::time::sleep(self.policy.interval).await;
        }

        *lock(&self.daemon) = Some(daemon);
        self.set_state(MountState::Mounted);
        tracing::info!(dir = %dir.display(), "mounted");
        Ok(())
    }

    /// Unmount `dir` and wait until it leaves the mount table.
    ///
    /// Succeeds immediately if `dir` is not mounted.
    ///
    /// # Errors
    ///
    /// Returns `MountError::UnmountFailure` if `dir` is still mounted when
    /// the deadline expires. The controller is left `Failed`.
    pub async fn unmount(&self, dir: &Path) -> Result<()> {
        if !self.is_mounted(dir)? {
            self.reap_daemon();
            self.set_state(MountState::Unmounted);
            return Ok(());
        }

        tracing::info!(dir = %dir.display(), "unmounting");
        if let Err(e) = self.backend.request_unmount(dir) {
            tracing::warn!(dir = %dir.display(), error = %format!("{e:#}"), "unmount request failed");
        }

        let deadline = Instant::now() + self.policy.timeout;
        loop {
            if !self.is_mounted(dir)? {
                self.reap_daemon();
                self.set_state(MountState::Unmounted);
                tracing::info!(dir = %dir.display(), "unmounted");
                return Ok(());
            }
            if Instant::now() >= deadline {
                self.set_state(MountState::Failed);
                return Err(MountError::UnmountFailure {
                    dir: dir.to_path_buf(),
                }
                .into());
            }
            tracing::debug!(dir = %dir.display(), "waiting for unmount");
            tokio::time::sleep(self.policy.interval).await;
        }
    }

    /// Synchronous single-shot unmount for `Drop` paths.
    ///
    /// Issues one unmount request and checks the table once; no polling.
    ///
    /// # Errors
    ///
    /// Returns `MountError::UnmountFailure` if `dir` is still mounted.
    pub fn unmount_blocking(&self, dir: &Path) -> Result<()> {
        if self.is_mounted(dir)? {
            self.backend.request_unmount(dir)?;
            if self.is_mounted(dir)? {
                self.set_state(MountState::Failed);
                return Err(MountError::UnmountFailure {
                    dir: dir.to_path_buf(),
                }
                .into());
            }
        }
        self.reap_daemon();
        self.set_state(MountState::Unmounted);
        Ok(())
    }

    /// Kill a daemon whose mount never appeared and drop any partial mount.
    fn abandon(&self, daemon: &mut B::Daemon, dir: &Path) {
        if let Err(e) = daemon.kill() {
            tracing::warn!(error = %e, "failed to kill mount daemon");
        }
        self.release_failed(dir);
    }

    /// Mark the mount failed and issue one best-effort unmount of `dir`.
    fn release_failed(&self, dir: &Path) {
        self.set_state(MountState::Failed);
        if let Err(e) = self.backend.request_unmount(dir) {
            tracing::debug!(dir = %dir.display(), error = %e, "defensive unmount failed");
        }
    }

    fn reap_daemon(&self) {
        if let Some(mut daemon) = lock(&self.daemon).take() {
            match daemon.try_wait() {
                Ok(Some(status)) => tracing::debug!(%status, "mount daemon exited"),
                Ok(None) => tracing::debug!("mount daemon still running after unmount"),
                Err(e) => tracing::debug!(error = %e, "failed to reap mount daemon"),
            }
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn mount_failure(image: &Path, dir: &Path, reason: &str) -> MountError {
    MountError::MountFailure {
        image: image.to_path_buf(),
        dir: dir.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Absolute, symlink-free form of `dir` as the kernel records it.
///
/// Only the parent is resolved: stat-ing a mount point whose daemon died
/// fails with `ENOTCONN`. Returns `None` when the parent does not exist.
fn canonical_target(dir: &Path) -> Result<Option<PathBuf>> {
    let absolute = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to resolve current directory")?
            .join(dir)
    };
    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return Ok(Some(absolute));
    };
    match std::fs::canonicalize(parent) {
        Ok(parent) => Ok(Some(parent.join(name))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("failed to resolve {}", parent.display()))
        }
    }
}
