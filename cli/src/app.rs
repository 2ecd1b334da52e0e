//! Application context — unified state passed to every command handler.
//!
//! `AppContext` resolves configuration once (file, then CLI overrides) and
//! builds the production adapters the commands wire into services.

use std::path::PathBuf;

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::application::services::image_catalog::ImageCatalog;
use crate::application::services::mount_controller::{MountController, PollPolicy};
use crate::domain::config::{GuestConfig, HarnessConfig, validate_config};
use crate::domain::image::{CacheLayout, Population};
use crate::domain::vm_profile::split_overrides;
use crate::infra::archive::TarArchiver;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config;
use crate::infra::installer::{CommandFormatter, CommandInstaller};
use crate::infra::mount::{FuseMountBackend, ProcMountTable};
use crate::output::OutputContext;

/// Production mount controller.
pub type Mounts = MountController<FuseMountBackend, ProcMountTable>;

/// Production image catalog.
pub type Catalog = ImageCatalog<
    CommandInstaller<TokioCommandRunner>,
    CommandFormatter<TokioCommandRunner>,
    TarArchiver,
>;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Emulator settings given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct EmulatorOverrides {
    /// Replaces `emulator.binary`.
    pub binary: Option<String>,
    /// Whitespace-separated flags replacing `emulator.extra_args`.
    pub args: Option<String>,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Emulator overrides.
    pub emulator: EmulatorOverrides,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Effective configuration.
    pub config: HarnessConfig,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn new(flags: &AppFlags, store: &impl ConfigStore) -> Result<Self> {
        let mut config = store.load()?;
        apply_overrides(&mut config, &flags.emulator);
        validate_config(&config)?;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet),
            mode,
            config,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Image cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        config::cache_dir(&self.config)
    }

    /// Directory per-run workspaces are created in.
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        config::run_dir(&self.config)
    }

    #[must_use]
    pub fn mount_controller(&self) -> Mounts {
        MountController::new(
            FuseMountBackend::new(&self.config.mount),
            ProcMountTable::default(),
            self.config.mount.fs_type.clone(),
            PollPolicy::from(&self.config.mount),
        )
    }

    /// Guest layout with the runner path resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if no runner is configured and the cache directory
    /// cannot be resolved.
    pub fn guest_config(&self) -> Result<GuestConfig> {
        Ok(GuestConfig {
            runner: Some(config::runner_path(&self.config)?),
            ..self.config.guest.clone()
        })
    }

    /// Image catalog filling root filesystems by `population`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be resolved.
    pub fn image_catalog(&self, population: Population) -> Result<Catalog> {
        let image = &self.config.image;
        Ok(ImageCatalog::new(
            CacheLayout::new(self.cache_dir()?),
            image.clone(),
            CommandInstaller::new(TokioCommandRunner::default(), image),
            CommandFormatter::new(TokioCommandRunner::default(), image),
            TarArchiver,
        )
        .with_population(population))
    }
}

/// Apply command-line emulator overrides on top of the loaded file.
pub fn apply_overrides(config: &mut HarnessConfig, overrides: &EmulatorOverrides) {
    if let Some(binary) = &overrides.binary {
        config.emulator.binary.clone_from(binary);
    }
    if let Some(args) = &overrides.args {
        config.emulator.extra_args = split_overrides(args);
    }
}
