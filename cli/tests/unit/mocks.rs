//! Shared fakes for unit tests.
//!
//! `FakeHost` simulates a FUSE host: mounts are tracked in memory and, like a
//! real loopback filesystem, whatever is written under a mounted directory
//! is moved into the image's stash on unmount and restored on the next mount.

#![allow(clippy::expect_used, dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use guestrun_cli::application::ports::{
    CommandRunner, DaemonHandle, Emulator, FsFormatter, Installer, MountBackend, MountTable,
    ProgressReporter,
};
use guestrun_cli::application::services::mount_controller::{MountController, PollPolicy};
use guestrun_cli::domain::error::ImageError;
use guestrun_cli::domain::mount_table::MountEntry;

use crate::helpers::{exit_status, ok_output};

// ── Fake FUSE host ────────────────────────────────────────────────────────────

/// How a spawned mount daemon behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonBehavior {
    /// The mount appears right away.
    Mounts,
    /// The daemon exits before mounting anything.
    Dies,
    /// The daemon stays alive but never mounts.
    Hangs,
}

struct HostState {
    /// mount dir → image
    mounts: HashMap<PathBuf, PathBuf>,
    behavior: DaemonBehavior,
    unmount_works: bool,
    spawned: usize,
    unmount_requests: usize,
    killed: usize,
}

#[derive(Clone)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
    stash: Arc<TempDir>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                mounts: HashMap::new(),
                behavior: DaemonBehavior::Mounts,
                unmount_works: true,
                spawned: 0,
                unmount_requests: 0,
                killed: 0,
            })),
            stash: Arc::new(tempfile::tempdir().expect("stash dir")),
        }
    }

    pub fn set_behavior(&self, behavior: DaemonBehavior) {
        self.state.lock().expect("lock").behavior = behavior;
    }

    pub fn set_unmount_works(&self, works: bool) {
        self.state.lock().expect("lock").unmount_works = works;
    }

    /// Pretend a crashed run left `dir` mounted.
    pub fn preload_mount(&self, image: &Path, dir: &Path) {
        let dir = canonical(dir);
        self.state
            .lock()
            .expect("lock")
            .mounts
            .insert(dir, image.to_path_buf());
    }

    pub fn is_mounted(&self, dir: &Path) -> bool {
        self.state
            .lock()
            .expect("lock")
            .mounts
            .contains_key(&canonical(dir))
    }

    pub fn mounted_count(&self) -> usize {
        self.state.lock().expect("lock").mounts.len()
    }

    pub fn spawned(&self) -> usize {
        self.state.lock().expect("lock").spawned
    }

    pub fn unmount_requests(&self) -> usize {
        self.state.lock().expect("lock").unmount_requests
    }

    pub fn killed(&self) -> usize {
        self.state.lock().expect("lock").killed
    }

    /// Directory holding the unmounted contents of `image`.
    pub fn image_contents(&self, image: &Path) -> PathBuf {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.stash.path().join(name)
    }

    pub fn backend(&self) -> FakeBackend {
        FakeBackend { host: self.clone() }
    }

    pub fn controller(&self) -> MountController<FakeBackend, FakeTable> {
        MountController::new(
            self.backend(),
            FakeTable { host: self.clone() },
            "fuse",
            fast_policy(),
        )
    }
}

pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        timeout: Duration::from_millis(200),
    }
}

fn canonical(dir: &Path) -> PathBuf {
    match (dir.parent(), dir.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| dir.to_path_buf()),
        _ => dir.to_path_buf(),
    }
}

fn move_entries(from: &Path, to: &Path) {
    let Ok(entries) = std::fs::read_dir(from) else {
        return;
    };
    std::fs::create_dir_all(to).expect("create target");
    for entry in entries.flatten() {
        let dest = to.join(entry.file_name());
        if dest.is_dir() {
            std::fs::remove_dir_all(&dest).expect("replace dir");
        }
        std::fs::rename(entry.path(), dest).expect("move entry");
    }
}

pub struct FakeBackend {
    host: FakeHost,
}

pub struct FakeDaemon {
    behavior: DaemonBehavior,
    host: FakeHost,
}

impl DaemonHandle for FakeDaemon {
    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(match self.behavior {
            DaemonBehavior::Dies => Some(exit_status(1)),
            DaemonBehavior::Mounts | DaemonBehavior::Hangs => None,
        })
    }

    fn kill(&mut self) -> Result<()> {
        self.host.state.lock().expect("lock").killed += 1;
        Ok(())
    }
}

impl MountBackend for FakeBackend {
    type Daemon = FakeDaemon;

    fn spawn_daemon(&self, image: &Path, dir: &Path) -> Result<FakeDaemon> {
        anyhow::ensure!(image.exists(), "image {} does not exist", image.display());
        let behavior = {
            let mut state = self.host.state.lock().expect("lock");
            state.spawned += 1;
            state.behavior
        };
        if behavior == DaemonBehavior::Mounts {
            move_entries(&self.host.image_contents(image), dir);
            self.host
                .state
                .lock()
                .expect("lock")
                .mounts
                .insert(canonical(dir), image.to_path_buf());
        }
        Ok(FakeDaemon {
            behavior,
            host: self.host.clone(),
        })
    }

    fn request_unmount(&self, dir: &Path) -> Result<()> {
        let image = {
            let mut state = self.host.state.lock().expect("lock");
            state.unmount_requests += 1;
            if !state.unmount_works {
                anyhow::bail!("fusermount: {}: Device or resource busy", dir.display());
            }
            state.mounts.remove(&canonical(dir))
        };
        if let Some(image) = image {
            move_entries(dir, &self.host.image_contents(&image));
        }
        Ok(())
    }
}

pub struct FakeTable {
    host: FakeHost,
}

impl MountTable for FakeTable {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        let state = self.host.state.lock().expect("lock");
        Ok(state
            .mounts
            .iter()
            .map(|(dir, image)| MountEntry {
                source: image.display().to_string(),
                target: dir.clone(),
                fs_type: "fuse".to_string(),
            })
            .collect())
    }
}

// ── Image tooling ─────────────────────────────────────────────────────────────

/// Installer that writes a marker file per manifest and counts invocations.
#[derive(Default)]
pub struct FakeInstaller {
    pub calls: Arc<AtomicUsize>,
    /// Fail for manifests whose file name contains this string.
    pub fail_on: Option<&'static str>,
    /// Do not write the bootloader artifact.
    pub skip_bootloader: bool,
}

impl FakeInstaller {
    pub fn failing_on(pattern: &'static str) -> Self {
        Self {
            fail_on: Some(pattern),
            ..Self::default()
        }
    }

    /// Handle that keeps counting after the installer is moved into a catalog.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Installer for FakeInstaller {
    async fn install(&self, manifest: &Path, target: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_on.is_some_and(|p| name.contains(p)) {
            return Err(ImageError::InstallerFailed {
                manifest: manifest.to_path_buf(),
                detail: "exited with exit status: 1".to_string(),
            }
            .into());
        }
        if name.starts_with("bootloader") {
            if !self.skip_bootloader {
                let boot = target.join("boot");
                std::fs::create_dir_all(&boot)?;
                std::fs::write(boot.join("bootloader.bios"), b"bios")?;
            }
        } else {
            let bin = target.join("usr/bin");
            std::fs::create_dir_all(&bin)?;
            std::fs::write(bin.join("ion"), b"shell")?;
        }
        Ok(())
    }
}

/// Formatter counting invocations. Images built from a tree get the tree's
/// contents as their unmounted contents on the backing host.
#[derive(Default)]
pub struct FakeFormatter {
    pub calls: AtomicUsize,
    pub tree_calls: AtomicUsize,
    pub fail: bool,
    pub host: Option<FakeHost>,
}

impl FakeFormatter {
    pub fn backed_by(host: &FakeHost) -> Self {
        Self {
            host: Some(host.clone()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }
}

impl FsFormatter for FakeFormatter {
    async fn format(&self, image: &Path, bootloader: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(bootloader.exists(), "missing bootloader");
        if self.fail {
            return Err(ImageError::FormatFailed {
                image: image.to_path_buf(),
                detail: "bad superblock".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn format_tree(&self, image: &Path, bootloader: &Path, tree: &Path) -> Result<()> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(bootloader.exists(), "missing bootloader");
        anyhow::ensure!(image.exists(), "image {} was not created", image.display());
        if self.fail {
            return Err(ImageError::FormatFailed {
                image: image.to_path_buf(),
                detail: "tree too large".to_string(),
            }
            .into());
        }
        if let Some(host) = &self.host {
            copy_tree(tree, &host.image_contents(image))?;
        }
        Ok(())
    }
}

// ── Emulator ──────────────────────────────────────────────────────────────────

/// Emulator that "runs" the injected payload by writing a scripted log.
pub struct FakeEmulator {
    host: FakeHost,
    /// Text the payload prints.
    pub output: String,
    /// Raw emulator exit code (`None` = killed by a signal).
    pub raw: Option<i32>,
    /// Keep running this long before exiting.
    pub delay: Option<Duration>,
    /// Leave the workspace mounted and refuse to release it afterwards.
    pub wedge_workspace: bool,
    pub seen_args: Mutex<Vec<String>>,
    /// Argument manifest found in the booted image.
    pub seen_manifest: Mutex<Option<String>>,
}

impl FakeEmulator {
    pub fn new(host: &FakeHost, output: &str, raw: Option<i32>) -> Self {
        Self {
            host: host.clone(),
            output: output.to_string(),
            raw,
            delay: None,
            wedge_workspace: false,
            seen_args: Mutex::new(Vec::new()),
            seen_manifest: Mutex::new(None),
        }
    }

    /// Emulator that exits as if the guest called debug-exit with `code`.
    pub fn exiting(host: &FakeHost, output: &str, code: i32) -> Self {
        Self::new(host, output, Some(code * 2 + 1))
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str, key: &str) -> Option<&'a str> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .find_map(|w| w[1].split(',').find_map(|part| part.strip_prefix(key)))
}

impl Emulator for FakeEmulator {
    async fn run(&self, args: &[String]) -> Result<Option<i32>> {
        *self.seen_args.lock().expect("lock") = args.to_vec();
        let log = arg_value(args, "-chardev", "path=").expect("log chardev");
        let drive = arg_value(args, "-drive", "file=").expect("drive");

        let manifest = self
            .host
            .image_contents(Path::new(drive))
            .join("etc/guestrun");
        *self.seen_manifest.lock().expect("lock") = std::fs::read_to_string(manifest).ok();

        std::fs::write(
            log,
            format!(
                "kernel: booting\r\n## guestrun: payload start ##\r\n{}## guestrun: payload end ##\r\nshutdown\r\n",
                self.output
            ),
        )?;
        if self.wedge_workspace {
            let image = Path::new(drive);
            self.host.preload_mount(image, &image.with_extension(""));
            self.host.set_unmount_works(false);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.raw)
    }
}

// ── Command runner ────────────────────────────────────────────────────────────

/// Runner that records invocations and performs `rsync --archive src/ dest`
/// with a plain recursive copy.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<Vec<String>>>,
    /// Program and bound of every `run_with_timeout` call.
    pub timeouts: Mutex<Vec<(String, Duration)>>,
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(ToString::to_string));
        self.calls.lock().expect("lock").push(call);
        if program == "rsync" {
            if let [_, src, dest] = args {
                copy_tree(Path::new(src.trim_end_matches('/')), Path::new(dest))?;
            }
        }
        Ok(ok_output(b""))
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        self.timeouts
            .lock()
            .expect("lock")
            .push((program.to_string(), timeout));
        self.run(program, args).await
    }

    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
        Ok(self.run(program, args).await?.status)
    }
}

// ── Progress reporter ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock").clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.lines.lock().expect("lock").push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.lines.lock().expect("lock").push(format!("ok: {message}"));
    }
    fn warn(&self, message: &str) {
        self.lines.lock().expect("lock").push(format!("warn: {message}"));
    }
}
