//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::time::Duration;

use anyhow::Result;

use crate::domain::{HarnessConfig, MountEntry};

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(&self, program: &str, args: &[&str], timeout: Duration)
    -> Result<Output>;
    /// Run a program with inherited stdio and return only its exit status.
    ///
    /// No timeout applies. The child is killed if the returned future is
    /// dropped before it completes.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus>;
}

// ── Mount Ports ───────────────────────────────────────────────────────────────

/// Handle on a running mount daemon.
pub trait DaemonHandle {
    /// Non-blocking liveness check; `Some` once the daemon has exited.
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;
    /// Ask the daemon to terminate without waiting for it.
    fn kill(&mut self) -> Result<()>;
}

/// Loopback filesystem backend: spawns the daemon that serves an image at a
/// directory and requests its removal.
///
/// Both operations are synchronous so the workspace `Drop` fallback can use
/// them outside the async runtime.
pub trait MountBackend {
    type Daemon: DaemonHandle;

    /// Start the mount daemon for `image` at `dir`. Returns once spawned,
    /// not once mounted.
    fn spawn_daemon(&self, image: &Path, dir: &Path) -> Result<Self::Daemon>;
    /// Issue an unmount request for `dir`. Success means the request was
    /// accepted, not that the mount is gone.
    fn request_unmount(&self, dir: &Path) -> Result<()>;
}

/// Read-only view of the host mount table.
pub trait MountTable {
    /// Current mount entries.
    fn entries(&self) -> Result<Vec<MountEntry>>;
}

// ── Image Build Ports ─────────────────────────────────────────────────────────

/// Declarative image installer.
#[allow(async_fn_in_trait)]
pub trait Installer {
    /// Install the packages described by `manifest` into `target`.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::InstallerFailed` when the installer exits non-zero.
    async fn install(&self, manifest: &Path, target: &Path) -> Result<()>;
}

/// Formats a raw image with the guest filesystem.
#[allow(async_fn_in_trait)]
pub trait FsFormatter {
    /// Create the guest filesystem on `image`, embedding `bootloader`.
    async fn format(&self, image: &Path, bootloader: &Path) -> Result<()>;
    /// Create the guest filesystem on `image` holding the contents of
    /// `tree`, embedding `bootloader`. No mount is involved.
    async fn format_tree(&self, image: &Path, bootloader: &Path, tree: &Path) -> Result<()>;
}

/// Packs and unpacks guest root trees.
#[allow(async_fn_in_trait)]
pub trait Archiver {
    /// Write the contents of `tree` into a new archive at `archive`,
    /// keeping permissions.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::ArchiveFailed` on any read or write failure.
    async fn pack(&self, tree: &Path, archive: &Path) -> Result<()>;
    /// Unpack `archive` into the existing directory `tree`.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::ArchiveFailed` on any read or write failure.
    async fn unpack(&self, archive: &Path, tree: &Path) -> Result<()>;
}

// ── Emulator Port ─────────────────────────────────────────────────────────────

/// Machine emulator.
#[allow(async_fn_in_trait)]
pub trait Emulator {
    /// Boot the guest with `args` and wait for the emulator to exit.
    ///
    /// Returns the raw exit code, or `None` if the emulator was terminated
    /// by a signal.
    async fn run(&self, args: &[String]) -> Result<Option<i32>>;
}

// ── Host Probe Port ───────────────────────────────────────────────────────────

/// Host capability queries used by preflight checks.
#[allow(async_fn_in_trait)]
pub trait HostProbe {
    /// `true` if `program` resolves on `PATH`.
    async fn has_program(&self, program: &str) -> bool;
    /// `true` if `path` exists (device nodes included).
    fn path_exists(&self, path: &Path) -> bool;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Configuration Port ────────────────────────────────────────────────────────

/// Loads the harness configuration.
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults if no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<HarnessConfig>;
    /// Path of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}
