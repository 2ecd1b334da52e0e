//! Mount state and host mount-table matching.

use std::path::{Path, PathBuf};

/// Lifecycle of a single (image, directory) loopback mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounting,
    Mounted,
    Failed,
}

/// One entry of the host mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: PathBuf,
    pub fs_type: String,
}

impl MountEntry {
    /// `true` when this entry is a `fs_type` mount at `target`.
    ///
    /// FUSE filesystems may report themselves as `fuse.<subtype>`, so a
    /// configured `fuse` also matches any subtype.
    #[must_use]
    pub fn matches(&self, fs_type: &str, target: &Path) -> bool {
        self.target == target && fs_type_matches(&self.fs_type, fs_type)
    }
}

fn fs_type_matches(actual: &str, wanted: &str) -> bool {
    actual == wanted
        || actual
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with('.'))
}
