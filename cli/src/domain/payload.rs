//! Guest payload description and argument manifest rendering.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::domain::error::RunError;

/// Executable, arguments and optional companion folder handed to the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestPayload {
    executable: PathBuf,
    arguments: Vec<String>,
    folder: Option<PathBuf>,
}

impl GuestPayload {
    /// # Errors
    ///
    /// Returns an error if `executable` has no file name component, or if
    /// its name or any argument contains a line break (the manifest holds
    /// one entry per line).
    pub fn new(
        executable: impl Into<PathBuf>,
        arguments: Vec<String>,
        folder: Option<PathBuf>,
    ) -> Result<Self> {
        let executable = executable.into();
        if executable.file_name().is_none() {
            return Err(RunError::PayloadWithoutName(executable).into());
        }
        let name = executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(bad) = std::iter::once(&name)
            .chain(&arguments)
            .find(|entry| has_line_break(entry))
        {
            return Err(RunError::ArgumentContainsNewline(bad.clone()).into());
        }
        Ok(Self {
            executable,
            arguments,
            folder,
        })
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    #[must_use]
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Base name the executable is installed under inside the guest.
    #[must_use]
    pub fn guest_name(&self) -> String {
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn has_line_break(entry: &str) -> bool {
    entry.contains(['\n', '\r'])
}

/// A single argument rewritten from a host path into the guest folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub host: String,
    pub guest: String,
}

/// Rendered manifest plus the rewrites applied while rendering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub text: String,
    pub rewrites: Vec<Rewrite>,
}

/// Render the argument manifest read by the guest-side runner.
///
/// One entry per line; the first line is the executable's base name. When
/// `host_folder` is the canonical path of the companion folder, arguments
/// starting with it are rewritten to `guest_folder`.
#[must_use]
pub fn render_manifest(
    payload: &GuestPayload,
    host_folder: Option<&str>,
    guest_folder: &str,
) -> Manifest {
    let mut text = String::new();
    let mut rewrites = Vec::new();

    text.push_str(&payload.guest_name());
    text.push('\n');

    for arg in payload.arguments() {
        match host_folder {
            Some(folder) if !folder.is_empty() && arg.starts_with(folder) => {
                let guest = arg.replacen(folder, guest_folder, 1);
                text.push_str(&guest);
                rewrites.push(Rewrite {
                    host: arg.clone(),
                    guest,
                });
            }
            _ => text.push_str(arg),
        }
        text.push('\n');
    }

    Manifest { text, rewrites }
}
