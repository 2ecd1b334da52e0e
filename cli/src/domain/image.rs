//! Cached image artifacts: flavors, cache layout and build metadata.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::workspace::RunId;

/// File name of the cached bootloader.
pub const BOOTLOADER_FILE: &str = "bootloader.bin";

/// Staging directory the bootloader installer writes into.
pub const BOOTLOADER_STAGING_DIR: &str = "bootloader";

/// Suffix of a base image that is still being built.
pub const PARTIAL_SUFFIX: &str = "partial";

/// Root filesystem flavor the guest boots from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFlavor {
    /// Headless image.
    #[default]
    Base,
    /// Image with a graphical session.
    Gui,
}

impl ImageFlavor {
    pub const ALL: [Self; 2] = [Self::Base, Self::Gui];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Gui => "gui",
        }
    }
}

impl fmt::Display for ImageFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageFlavor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "gui" => Ok(Self::Gui),
            other => Err(ConfigError::InvalidValue {
                key: "flavor".to_string(),
                value: other.to_string(),
                expected: "base | gui".to_string(),
            }),
        }
    }
}

/// How a guest root filesystem is filled on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Population {
    /// Mount the image through the loopback daemon and write into it.
    Mount,
    /// Keep the base root as a tar archive and build every working image
    /// from an unpacked tree. Needs no FUSE.
    Archive,
}

impl Population {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Archive => "archive",
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Population {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mount" => Ok(Self::Mount),
            "archive" => Ok(Self::Archive),
            other => Err(ConfigError::InvalidValue {
                key: "population".to_string(),
                value: other.to_string(),
                expected: "mount | archive".to_string(),
            }),
        }
    }
}

/// Manifest consumed by the image installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Bootloader,
    Flavor(ImageFlavor),
}

impl ManifestKind {
    /// File name the embedded default is materialized under.
    #[must_use]
    pub fn file_name(self) -> String {
        match self {
            Self::Bootloader => "bootloader.toml".to_string(),
            Self::Flavor(flavor) => format!("{flavor}.toml"),
        }
    }
}

/// Paths of every durable and transient artifact under the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn bootloader(&self) -> PathBuf {
        self.root.join(BOOTLOADER_FILE)
    }

    /// Staging directory owned by the builder `build`.
    #[must_use]
    pub fn bootloader_staging(&self, build: &RunId) -> PathBuf {
        self.root
            .join(format!("{BOOTLOADER_STAGING_DIR}-{}", build.suffix()))
    }

    /// Published base image for `flavor`.
    #[must_use]
    pub fn image(&self, flavor: ImageFlavor) -> PathBuf {
        self.root.join(format!("{flavor}.bin"))
    }

    /// Published root archive for `flavor`.
    #[must_use]
    pub fn archive(&self, flavor: ImageFlavor) -> PathBuf {
        self.root.join(format!("{flavor}.tar"))
    }

    /// Published base artifact for `flavor` under `population`.
    #[must_use]
    pub fn artifact(&self, flavor: ImageFlavor, population: Population) -> PathBuf {
        match population {
            Population::Mount => self.image(flavor),
            Population::Archive => self.archive(flavor),
        }
    }

    /// In-progress base image of the builder `build`; renamed onto
    /// [`Self::image`] when complete.
    #[must_use]
    pub fn partial_image(&self, flavor: ImageFlavor, build: &RunId) -> PathBuf {
        Self::staged(&self.image(flavor), build)
    }

    /// In-progress artifact of the builder `build` under `population`.
    #[must_use]
    pub fn partial(&self, flavor: ImageFlavor, population: Population, build: &RunId) -> PathBuf {
        Self::staged(&self.artifact(flavor, population), build)
    }

    /// Directory the partial image is mounted at while it is populated.
    #[must_use]
    pub fn build_mount_dir(&self, flavor: ImageFlavor, build: &RunId) -> PathBuf {
        self.root.join(format!("{flavor}-{}", build.suffix()))
    }

    /// Temporary sibling of `path` that `build` writes before renaming it
    /// into place.
    #[must_use]
    pub fn staged(path: &Path, build: &RunId) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{PARTIAL_SUFFIX}", build.suffix()));
        path.with_file_name(name)
    }

    /// Build record of the `flavor` artifact under `population`.
    #[must_use]
    pub fn metadata(&self, flavor: ImageFlavor, population: Population) -> PathBuf {
        match population {
            Population::Mount => self.root.join(format!("{flavor}.json")),
            Population::Archive => self.root.join(format!("{flavor}.tar.json")),
        }
    }

    #[must_use]
    pub fn manifest(&self, kind: ManifestKind) -> PathBuf {
        self.root.join(kind.file_name())
    }
}

/// Bootloader plus base root, both published in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseImage {
    pub flavor: ImageFlavor,
    pub bootloader: PathBuf,
    /// Formatted image under [`Population::Mount`], root archive under
    /// [`Population::Archive`].
    pub image: PathBuf,
    pub population: Population,
}

/// Build record stored next to each cached base image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub flavor: ImageFlavor,
    pub population: Population,
    pub built_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub manifest: PathBuf,
}
