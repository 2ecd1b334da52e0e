//! Emulator hardware profile and command-line construction.

use std::collections::HashSet;
use std::path::Path;

/// Fixed hardware profile every guest boots with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmProfile {
    pub cpus: u32,
    pub memory_mb: u32,
    /// Use KVM acceleration (only when `/dev/kvm` exists).
    pub kvm: bool,
    /// Keep a display attached instead of running headless.
    pub gui: bool,
    /// Operator-supplied flags merged over the defaults.
    pub overrides: Vec<String>,
}

impl VmProfile {
    /// Build the full emulator argument list for one run.
    #[must_use]
    pub fn emulator_args(&self, disk: &Path, log: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-cpu", "max",
            "-machine", "q35",
            "-m", &self.memory_mb.to_string(),
            "-smp", &self.cpus.to_string(),
            "-serial", "mon:stdio",
            "-chardev", &format!("file,id=log,path={}", log.display()),
            "-netdev", "user,id=net0",
            "-device", "isa-debugcon,chardev=log",
            "-device", "isa-debug-exit",
            "-device", "e1000,netdev=net0",
            "-drive", &format!("file={},format=raw", disk.display()),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        if self.kvm {
            args.extend(["-accel".to_string(), "kvm".to_string()]);
        }
        if !self.gui {
            args.extend(["-nographic", "-vga", "none"].map(String::from));
        }

        merge_emulator_args(&args, &self.overrides)
    }
}

/// Merge operator flags over the default flag set.
///
/// Every default option the operator also passes is dropped together with
/// its value; the operator's arguments are then appended verbatim. Repeated
/// defaults such as `-device` are all dropped when the operator supplies one.
#[must_use]
pub fn merge_emulator_args(defaults: &[String], overrides: &[String]) -> Vec<String> {
    if overrides.is_empty() {
        return defaults.to_vec();
    }

    let overridden: HashSet<&str> = overrides
        .iter()
        .filter(|arg| arg.starts_with('-'))
        .map(String::as_str)
        .collect();

    let mut merged = Vec::with_capacity(defaults.len() + overrides.len());
    let mut i = 0;
    while i < defaults.len() {
        let opt = &defaults[i];
        let has_value = defaults.get(i + 1).is_some_and(|next| !next.starts_with('-'));
        let step = if has_value { 2 } else { 1 };

        if !overridden.contains(opt.as_str()) {
            merged.extend_from_slice(&defaults[i..i + step]);
        }
        i += step;
    }

    merged.extend(overrides.iter().cloned());
    merged
}

/// Split a whitespace-separated override string (`GUESTRUN_QEMU_ARGS`).
#[must_use]
pub fn split_overrides(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(String::from).collect()
}
