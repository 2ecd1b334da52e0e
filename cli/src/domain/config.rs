//! Domain types and validators for guestrun configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use guestrund::protocol::MANIFEST_PATH;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::image::Population;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.guestrun/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory holding the cached bootloader and base images.
    /// Defaults to `~/.guestrun` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Directory holding per-run workspaces. Defaults to the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_dir: Option<PathBuf>,
    pub emulator: EmulatorConfig,
    pub mount: MountConfig,
    pub image: ImageConfig,
    pub guest: GuestConfig,
}

/// Machine emulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub binary: String,
    pub cpus: u32,
    pub memory_mb: u32,
    /// Operator overrides merged over the default flag set.
    pub extra_args: Vec<String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            binary: "qemu-system-x86_64".to_string(),
            cpus: 4,
            memory_mb: 2048,
            extra_args: Vec::new(),
        }
    }
}

/// Loopback mount daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub daemon: String,
    pub unmount: String,
    /// Mount-table filesystem type written by the daemon (`fuse` also
    /// matches `fuse.<subtype>`).
    pub fs_type: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            daemon: "redoxfs".to_string(),
            unmount: "fusermount".to_string(),
            fs_type: "fuse".to_string(),
            poll_interval_ms: 10,
            timeout_secs: 30,
        }
    }
}

impl MountConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Image build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub installer: String,
    pub formatter: String,
    /// Builds an image from a root tree (`<program> <image> <tree> <bootloader>`).
    pub tree_formatter: String,
    /// How root filesystems are filled. Unset: mount when FUSE is
    /// available, archive otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population: Option<Population>,
    pub size_mb: u64,
    /// Path of the bootloader binary inside the installer's output tree.
    pub bootloader_artifact: PathBuf,
    pub install_timeout_secs: u64,
    pub manifests: ManifestOverrides,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            installer: "redox_installer".to_string(),
            formatter: "redoxfs-mkfs".to_string(),
            tree_formatter: "redoxfs-ar".to_string(),
            population: None,
            size_mb: 3 * 1024,
            bootloader_artifact: PathBuf::from("boot/bootloader.bios"),
            install_timeout_secs: 3600,
            manifests: ManifestOverrides::default(),
        }
    }
}

impl ImageConfig {
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_mb * 1024 * 1024
    }

    #[must_use]
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

/// Manifest paths replacing the embedded defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ManifestOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootloader: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gui: Option<PathBuf>,
}

/// Layout of the guest filesystem the payload is injected into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestConfig {
    /// Directory (relative to the guest root) receiving the executable.
    pub bin_dir: PathBuf,
    /// File (relative to the guest root) receiving the argument manifest.
    pub manifest_path: PathBuf,
    /// Absolute guest directory receiving the companion folder.
    pub folder_dest: String,
    /// Upper bound for copying the companion folder into the image.
    pub copy_timeout_secs: u64,
    /// Host path of the guest runner built for the guest target. Defaults
    /// to `guestrund` in the cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<PathBuf>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from("usr/bin"),
            manifest_path: PathBuf::from(MANIFEST_PATH.trim_start_matches('/')),
            folder_dest: "/root".to_string(),
            copy_timeout_secs: 3600,
            runner: None,
        }
    }
}

impl GuestConfig {
    #[must_use]
    pub fn copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout_secs)
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

const MIN_MEMORY_MB: u32 = 128;
const MIN_IMAGE_MB: u64 = 64;

fn invalid(key: &str, value: impl ToString, expected: &str) -> anyhow::Error {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
    .into()
}

/// Validates numeric bounds and required program names.
///
/// # Errors
///
/// Returns a [`ConfigError`] for the first out-of-range value.
pub fn validate_config(config: &HarnessConfig) -> Result<()> {
    if config.emulator.cpus == 0 {
        return Err(invalid("emulator.cpus", config.emulator.cpus, "at least 1"));
    }
    if config.emulator.memory_mb < MIN_MEMORY_MB {
        return Err(invalid(
            "emulator.memory_mb",
            config.emulator.memory_mb,
            "at least 128",
        ));
    }
    if config.emulator.binary.trim().is_empty() {
        return Err(invalid("emulator.binary", "", "a program name"));
    }
    if config.image.size_mb < MIN_IMAGE_MB {
        return Err(invalid("image.size_mb", config.image.size_mb, "at least 64"));
    }
    if config.mount.poll_interval_ms == 0 {
        return Err(invalid("mount.poll_interval_ms", 0, "a positive number"));
    }
    if config.mount.timeout_secs == 0 {
        return Err(invalid("mount.timeout_secs", 0, "a positive number"));
    }
    if config.guest.copy_timeout_secs == 0 {
        return Err(invalid("guest.copy_timeout_secs", 0, "a positive number"));
    }
    if !config.guest.folder_dest.starts_with('/') {
        return Err(invalid(
            "guest.folder_dest",
            &config.guest.folder_dest,
            "an absolute guest path",
        ));
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
