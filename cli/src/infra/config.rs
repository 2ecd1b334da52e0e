//! Infrastructure implementation of the `ConfigStore` port.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ConfigStore;
use crate::domain::config::HarnessConfig;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "GUESTRUN_CONFIG";

/// Directory under `$HOME` holding the configuration and the image cache.
pub const HOME_DIR_NAME: &str = ".guestrun";

/// Production implementation of `ConfigStore` that uses a YAML file on disk.
pub struct YamlConfigStore;

impl ConfigStore for YamlConfigStore {
    fn load(&self) -> Result<HarnessConfig> {
        let path = self.path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(HarnessConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(HarnessConfig::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(val));
        }
        Ok(guestrun_home()?.join("config.yaml"))
    }
}

/// `~/.guestrun`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn guestrun_home() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(HOME_DIR_NAME))
}

/// Image cache directory: configured, or `~/.guestrun`.
///
/// # Errors
///
/// Returns an error if no directory is configured and the home directory
/// cannot be determined.
pub fn cache_dir(config: &HarnessConfig) -> Result<PathBuf> {
    match &config.cache_dir {
        Some(dir) => Ok(dir.clone()),
        None => guestrun_home(),
    }
}

/// File name of the guest runner in the cache directory.
pub const RUNNER_FILE: &str = "guestrund";

/// Host path of the guest runner: configured, or `guestrund` in the cache
/// directory.
///
/// # Errors
///
/// Returns an error if no runner is configured and the cache directory
/// cannot be resolved.
pub fn runner_path(config: &HarnessConfig) -> Result<PathBuf> {
    match &config.guest.runner {
        Some(path) => Ok(path.clone()),
        None => Ok(cache_dir(config)?.join(RUNNER_FILE)),
    }
}

/// Per-run workspace directory: configured, or the system temp directory.
#[must_use]
pub fn run_dir(config: &HarnessConfig) -> PathBuf {
    config.run_dir.clone().unwrap_or_else(std::env::temp_dir)
}
