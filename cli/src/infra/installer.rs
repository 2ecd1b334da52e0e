//! Command-line image installer and filesystem formatter.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{CommandRunner, FsFormatter, Installer};
use crate::domain::config::ImageConfig;
use crate::domain::error::ImageError;

/// Runs `<installer> --config <manifest> <target>`.
pub struct CommandInstaller<R: CommandRunner> {
    runner: R,
    program: String,
    timeout: Duration,
}

impl<R: CommandRunner> CommandInstaller<R> {
    #[must_use]
    pub fn new(runner: R, config: &ImageConfig) -> Self {
        Self {
            runner,
            program: config.installer.clone(),
            timeout: config.install_timeout(),
        }
    }
}

impl<R: CommandRunner> Installer for CommandInstaller<R> {
    async fn install(&self, manifest: &Path, target: &Path) -> Result<()> {
        let manifest_arg = manifest.to_string_lossy();
        let target_arg = target.to_string_lossy();
        tracing::info!(manifest = %manifest.display(), target = %target.display(), "installing");
        let output = self
            .runner
            .run_with_timeout(
                &self.program,
                &["--config", &manifest_arg, &target_arg],
                self.timeout,
            )
            .await
            .map_err(|e| ImageError::InstallerFailed {
                manifest: manifest.to_path_buf(),
                detail: format!("{e:#}"),
            })?;
        if !output.status.success() {
            return Err(ImageError::InstallerFailed {
                manifest: manifest.to_path_buf(),
                detail: failure_detail(&output),
            }
            .into());
        }
        Ok(())
    }
}

/// Runs `<formatter> <image> <bootloader>`, or
/// `<tree_formatter> <image> <tree> <bootloader>` for a prebuilt tree.
pub struct CommandFormatter<R: CommandRunner> {
    runner: R,
    program: String,
    tree_program: String,
}

impl<R: CommandRunner> CommandFormatter<R> {
    #[must_use]
    pub fn new(runner: R, config: &ImageConfig) -> Self {
        Self {
            runner,
            program: config.formatter.clone(),
            tree_program: config.tree_formatter.clone(),
        }
    }

    async fn run_formatter(&self, program: &str, image: &Path, args: &[&str]) -> Result<()> {
        let output = self
            .runner
            .run(program, args)
            .await
            .map_err(|e| ImageError::FormatFailed {
                image: image.to_path_buf(),
                detail: format!("{e:#}"),
            })?;
        if !output.status.success() {
            return Err(ImageError::FormatFailed {
                image: image.to_path_buf(),
                detail: failure_detail(&output),
            }
            .into());
        }
        Ok(())
    }
}

impl<R: CommandRunner> FsFormatter for CommandFormatter<R> {
    async fn format(&self, image: &Path, bootloader: &Path) -> Result<()> {
        let image_arg = image.to_string_lossy();
        let bootloader_arg = bootloader.to_string_lossy();
        tracing::info!(image = %image.display(), "formatting");
        self.run_formatter(&self.program, image, &[&image_arg, &bootloader_arg])
            .await
    }

    async fn format_tree(&self, image: &Path, bootloader: &Path, tree: &Path) -> Result<()> {
        let image_arg = image.to_string_lossy();
        let tree_arg = tree.to_string_lossy();
        let bootloader_arg = bootloader.to_string_lossy();
        tracing::info!(image = %image.display(), tree = %tree.display(), "formatting from tree");
        self.run_formatter(
            &self.tree_program,
            image,
            &[&image_arg, &tree_arg, &bootloader_arg],
        )
        .await
    }
}

fn failure_detail(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        format!("exited with {}: {stderr}", output.status)
    }
}
