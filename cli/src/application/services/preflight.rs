//! Application service — host capability checks run before any image work.

use std::path::Path;

use anyhow::Result;

use crate::application::ports::HostProbe;
use crate::domain::config::HarnessConfig;
use crate::domain::error::{PreflightError, RunError};
use crate::domain::image::Population;

pub const FUSE_DEVICE: &str = "/dev/fuse";
pub const KVM_DEVICE: &str = "/dev/kvm";

/// What the upcoming command needs from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// The emulator will be launched.
    pub emulator: bool,
    /// A companion folder will be copied into the guest.
    pub folder_copy: bool,
}

/// Host facts discovered during preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostReport {
    pub kvm: bool,
    /// How root filesystems will be filled on this host.
    pub population: Population,
}

/// Configured population, or mount when FUSE is present and archive
/// otherwise.
#[must_use]
pub fn resolve_population(host: &impl HostProbe, config: &HarnessConfig) -> Population {
    config.image.population.unwrap_or_else(|| {
        if host.path_exists(Path::new(FUSE_DEVICE)) {
            Population::Mount
        } else {
            Population::Archive
        }
    })
}

/// Check that every external program and device the run depends on is present.
///
/// # Errors
///
/// Returns the first `PreflightError` found, or `RunError::RunnerNotFound`
/// if the emulator is needed and the configured guest runner is missing.
pub async fn check_host(
    host: &impl HostProbe,
    config: &HarnessConfig,
    needs: Requirements,
) -> Result<HostReport> {
    let population = resolve_population(host, config);
    let mut programs: Vec<(&str, &str)> = match population {
        Population::Mount => vec![
            (config.mount.daemon.as_str(), "redoxfs"),
            (config.mount.unmount.as_str(), "fuse"),
            (config.image.installer.as_str(), "redox_installer"),
            (config.image.formatter.as_str(), "redoxfs"),
        ],
        Population::Archive => vec![
            (config.image.installer.as_str(), "redox_installer"),
            (config.image.tree_formatter.as_str(), "redoxfs"),
        ],
    };
    if needs.emulator {
        programs.insert(0, (config.emulator.binary.as_str(), "qemu"));
    }
    if needs.folder_copy {
        programs.push(("rsync", "rsync"));
    }

    for (program, hint) in programs {
        if !host.has_program(program).await {
            return Err(PreflightError::MissingProgram {
                program: program.to_string(),
                hint: hint.to_string(),
            }
            .into());
        }
        tracing::debug!(program, "found");
    }

    if population == Population::Mount && !host.path_exists(Path::new(FUSE_DEVICE)) {
        return Err(PreflightError::NoFuse {
            device: FUSE_DEVICE.to_string(),
        }
        .into());
    }
    tracing::debug!(%population, "population resolved");

    match &config.guest.runner {
        Some(runner) if needs.emulator && !host.path_exists(runner) => {
            return Err(RunError::RunnerNotFound(runner.clone()).into());
        }
        _ => {}
    }

    let kvm = host.path_exists(Path::new(KVM_DEVICE));
    if !kvm {
        tracing::warn!("{KVM_DEVICE} not found, guest will run without acceleration");
    }
    Ok(HostReport { kvm, population })
}
