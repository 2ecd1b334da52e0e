//! Run identifiers and per-run workspace path derivation.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

/// Prefix shared by run identifiers and every derived workspace path.
pub const RUN_PREFIX: &str = "run-";

const PATH_PREFIX: &str = "guestrun-";

/// Unique token identifying a single invocation.
///
/// Format: `run-` followed by 16 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh identifier.
    ///
    /// Entropy sources: nanosecond timestamp and two independent `RandomState`
    /// hashes.
    #[must_use]
    pub fn generate() -> Self {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};

        let mut hasher = RandomState::new().build_hasher();
        hasher.write_u128(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
        );
        hasher.write_u64(RandomState::new().build_hasher().finish());
        hasher.write_u64(RandomState::new().build_hasher().finish());
        Self(format!("{RUN_PREFIX}{:016x}", hasher.finish()))
    }

    /// Parse an identifier, validating its format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID doesn't match `run-` + 16 hex characters.
    pub fn parse(id: &str) -> Result<Self> {
        validate_run_id(id)?;
        Ok(Self(id.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex part of the identifier.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.0[RUN_PREFIX.len()..]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validates run identifier format.
///
/// # Errors
///
/// Returns an error if the ID doesn't match the expected format.
pub fn validate_run_id(id: &str) -> Result<()> {
    let Some(hex) = id.strip_prefix(RUN_PREFIX) else {
        anyhow::bail!("invalid run id: {id}");
    };
    if hex.len() != 16 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("invalid run id: {id}");
    }
    Ok(())
}

/// Every host path owned by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub run_id: RunId,
    pub working_image: PathBuf,
    pub mount_dir: PathBuf,
    pub log: PathBuf,
}

impl WorkspacePaths {
    /// Derive the per-run paths under `root`.
    ///
    /// The mapping is injective in the run id, so distinct ids never alias.
    #[must_use]
    pub fn derive(root: &Path, run_id: &RunId) -> Self {
        let stem = format!("{PATH_PREFIX}{}", run_id.suffix());
        Self {
            run_id: run_id.clone(),
            working_image: root.join(format!("{stem}.bin")),
            mount_dir: root.join(&stem),
            log: root.join(format!("{stem}.log")),
        }
    }

    /// All paths, in teardown order.
    #[must_use]
    pub fn all(&self) -> [&Path; 3] {
        [&self.working_image, &self.mount_dir, &self.log]
    }
}
