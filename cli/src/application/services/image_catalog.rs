//! Application service — cached bootloader and base image builds.
//!
//! Artifacts are built lazily, at most once per catalog, and published to
//! the cache directory only by an atomic rename. A build that fails leaves
//! nothing under the final name, so the next run starts over.
//!
//! Every catalog stages under names derived from its own build id, so
//! builders in other processes sharing the cache never touch each other's
//! partial files or mount directories.
//!
//! Under [`Population::Mount`] the base artifact is a formatted image filled
//! through the loopback mount; an archive left by an earlier archive build
//! is unpacked into it instead of running the installer again. Under
//! [`Population::Archive`] the base artifact is a tar of the installed tree
//! and each run builds its image from an unpacked copy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::OnceCell;

use crate::application::ports::{
    Archiver, FsFormatter, Installer, MountBackend, MountTable, ProgressReporter,
};
use crate::application::services::fs_ops::{exists, remove_dir_all_if_exists, remove_file_if_exists};
use crate::application::services::mount_controller::MountController;
use crate::domain::config::ImageConfig;
use crate::domain::error::ImageError;
use crate::domain::image::{
    BaseImage, CacheLayout, ImageFlavor, ImageMetadata, ManifestKind, Population,
};
use crate::domain::workspace::RunId;

const BOOTLOADER_MANIFEST: &str = include_str!("../../../res/bootloader.toml");
const BASE_MANIFEST: &str = include_str!("../../../res/base.toml");
const GUI_MANIFEST: &str = include_str!("../../../res/gui.toml");

/// Default manifest shipped with the binary for `kind`.
#[must_use]
pub fn embedded_manifest(kind: ManifestKind) -> &'static str {
    match kind {
        ManifestKind::Bootloader => BOOTLOADER_MANIFEST,
        ManifestKind::Flavor(ImageFlavor::Base) => BASE_MANIFEST,
        ManifestKind::Flavor(ImageFlavor::Gui) => GUI_MANIFEST,
    }
}

pub struct ImageCatalog<I: Installer, F: FsFormatter, A: Archiver> {
    layout: CacheLayout,
    config: ImageConfig,
    installer: I,
    formatter: F,
    archiver: A,
    population: Population,
    build_id: RunId,
    bootloader: OnceCell<PathBuf>,
    base: OnceCell<BaseImage>,
    gui: OnceCell<BaseImage>,
}

impl<I: Installer, F: FsFormatter, A: Archiver> ImageCatalog<I, F, A> {
    /// Catalog populating through mounts; see [`Self::with_population`].
    #[must_use]
    pub fn new(
        layout: CacheLayout,
        config: ImageConfig,
        installer: I,
        formatter: F,
        archiver: A,
    ) -> Self {
        Self {
            layout,
            config,
            installer,
            formatter,
            archiver,
            population: Population::Mount,
            build_id: RunId::generate(),
            bootloader: OnceCell::new(),
            base: OnceCell::new(),
            gui: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_population(mut self, population: Population) -> Self {
        self.population = population;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    #[must_use]
    pub fn population(&self) -> Population {
        self.population
    }

    /// Token naming this catalog's staging files.
    #[must_use]
    pub fn build_id(&self) -> &RunId {
        &self.build_id
    }

    fn image_cell(&self, flavor: ImageFlavor) -> &OnceCell<BaseImage> {
        match flavor {
            ImageFlavor::Base => &self.base,
            ImageFlavor::Gui => &self.gui,
        }
    }

    /// Return the cached bootloader, building it if absent.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` if the installer fails or does not produce the
    /// bootloader artifact.
    pub async fn ensure_bootloader(&self, reporter: &impl ProgressReporter) -> Result<PathBuf> {
        self.bootloader
            .get_or_try_init(|| self.build_bootloader(reporter))
            .await
            .cloned()
    }

    /// Return the cached base image for `flavor`, building it if absent.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` or `MountError` if any build step fails. No file
    /// is left at the final image path in that case.
    pub async fn ensure_base_image<B: MountBackend, T: MountTable>(
        &self,
        flavor: ImageFlavor,
        mounts: &MountController<B, T>,
        reporter: &impl ProgressReporter,
    ) -> Result<BaseImage> {
        self.image_cell(flavor)
            .get_or_try_init(|| self.build_base_image(flavor, mounts, reporter))
            .await
            .cloned()
    }

    /// Drop the leftovers of a `flavor` build that was cancelled midway.
    ///
    /// # Errors
    ///
    /// Returns an error if the build directory stays mounted.
    pub async fn discard_partial<B: MountBackend, T: MountTable>(
        &self,
        flavor: ImageFlavor,
        mounts: &MountController<B, T>,
    ) -> Result<()> {
        let dir = self.layout.build_mount_dir(flavor, &self.build_id);
        mounts.unmount(&dir).await?;
        remove_file_if_exists(&self.layout.partial(flavor, self.population, &self.build_id))
            .await?;
        remove_dir_all_if_exists(&self.layout.bootloader_staging(&self.build_id)).await?;
        self.clear_build_dir(&dir).await;
        Ok(())
    }

    /// Build metadata recorded for `flavor`, if it has been built.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata file exists but cannot be parsed.
    pub async fn metadata(&self, flavor: ImageFlavor) -> Result<Option<ImageMetadata>> {
        let path = self.layout.metadata(flavor, self.population);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        let meta = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(meta))
    }

    /// Path of the manifest for `kind`.
    ///
    /// A configured override wins; otherwise the embedded default is written
    /// into the cache directory (refreshed when its content changed).
    ///
    /// # Errors
    ///
    /// Returns an error if the default cannot be written.
    pub async fn manifest(&self, kind: ManifestKind) -> Result<PathBuf> {
        let configured = match kind {
            ManifestKind::Bootloader => &self.config.manifests.bootloader,
            ManifestKind::Flavor(ImageFlavor::Base) => &self.config.manifests.base,
            ManifestKind::Flavor(ImageFlavor::Gui) => &self.config.manifests.gui,
        };
        if let Some(path) = configured {
            return Ok(path.clone());
        }

        let path = self.layout.manifest(kind);
        let content = embedded_manifest(kind);
        let current = tokio::fs::read_to_string(&path).await.ok();
        if current.as_deref() != Some(content) {
            create_cache_dir(self.layout.root()).await?;
            self.write_staged(&path, content.as_bytes()).await?;
        }
        Ok(path)
    }

    async fn build_bootloader(&self, reporter: &impl ProgressReporter) -> Result<PathBuf> {
        let target = self.layout.bootloader();
        if exists(&target).await? {
            tracing::debug!(path = %target.display(), "bootloader cached");
            return Ok(target);
        }

        reporter.step("building bootloader...");
        let manifest = self.manifest(ManifestKind::Bootloader).await?;
        let staging = self.layout.bootloader_staging(&self.build_id);
        remove_dir_all_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging)
            .await
            .with_context(|| format!("failed to create {}", staging.display()))?;

        let result = async {
            self.installer.install(&manifest, &staging).await?;
            let artifact = staging.join(&self.config.bootloader_artifact);
            if !exists(&artifact).await? {
                return Err(ImageError::MissingArtifact(artifact).into());
            }
            tokio::fs::rename(&artifact, &target)
                .await
                .with_context(|| format!("failed to publish {}", target.display()))
        }
        .await;

        if let Err(e) = remove_dir_all_if_exists(&staging).await {
            tracing::warn!(error = %e, "failed to remove bootloader staging directory");
        }
        result.context("failed to build bootloader")?;

        reporter.success("bootloader built");
        Ok(target)
    }

    async fn build_base_image<B: MountBackend, T: MountTable>(
        &self,
        flavor: ImageFlavor,
        mounts: &MountController<B, T>,
        reporter: &impl ProgressReporter,
    ) -> Result<BaseImage> {
        let population = self.population;
        let artifact = self.layout.artifact(flavor, population);
        if exists(&artifact).await? {
            tracing::debug!(path = %artifact.display(), "base image cached");
            return Ok(BaseImage {
                flavor,
                bootloader: self.layout.bootloader(),
                image: artifact,
                population,
            });
        }

        let bootloader = self.ensure_bootloader(reporter).await?;
        let manifest = self.manifest(ManifestKind::Flavor(flavor)).await?;
        let partial = self.layout.partial(flavor, population, &self.build_id);
        let dir = self.layout.build_mount_dir(flavor, &self.build_id);

        reporter.step(&format!("building {flavor} image..."));
        remove_file_if_exists(&partial).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let archive = self.layout.archive(flavor);
        let source = if population == Population::Mount && exists(&archive).await? {
            reporter.step(&format!("extracting {}", archive.display()));
            RootSource::Archive(archive)
        } else {
            RootSource::Manifest(manifest.clone())
        };
        let populated = match population {
            Population::Mount => self.populate(&partial, &bootloader, &source, &dir, mounts).await,
            Population::Archive => self.populate_archive(&partial, &source, &dir).await,
        };
        if let Err(e) = populated {
            if let Err(unmount) = mounts.unmount(&dir).await {
                tracing::warn!(error = %format!("{unmount:#}"), "cleanup unmount failed");
            }
            if let Err(rm) = remove_file_if_exists(&partial).await {
                tracing::warn!(error = %rm, "failed to remove partial image");
            }
            self.clear_build_dir(&dir).await;
            return Err(e.context(format!("failed to build {flavor} image")));
        }

        let published = self.publish(flavor, &partial, &artifact, manifest).await;
        if published.is_err() {
            if let Err(rm) = remove_file_if_exists(&partial).await {
                tracing::warn!(error = %rm, "failed to remove partial image");
            }
        }
        self.clear_build_dir(&dir).await;
        published?;

        reporter.success(&format!("{flavor} image built"));
        Ok(BaseImage {
            flavor,
            bootloader,
            image: artifact,
            population,
        })
    }

    async fn populate<B: MountBackend, T: MountTable>(
        &self,
        partial: &Path,
        bootloader: &Path,
        source: &RootSource,
        dir: &Path,
        mounts: &MountController<B, T>,
    ) -> Result<()> {
        self.create_sized(partial).await?;
        self.formatter.format(partial, bootloader).await?;
        mounts.mount(partial, dir).await?;
        self.fill(source, dir).await?;
        mounts.unmount(dir).await
    }

    async fn populate_archive(
        &self,
        partial: &Path,
        source: &RootSource,
        dir: &Path,
    ) -> Result<()> {
        self.fill(source, dir).await?;
        self.archiver.pack(dir, partial).await
    }

    async fn fill(&self, source: &RootSource, dir: &Path) -> Result<()> {
        match source {
            RootSource::Manifest(manifest) => self.installer.install(manifest, dir).await,
            RootSource::Archive(archive) => self.archiver.unpack(archive, dir).await,
        }
    }

    /// Fill `tree` with the root of the archived `base`.
    ///
    /// # Errors
    ///
    /// Returns `ImageError::ArchiveFailed` if the archive cannot be read.
    pub async fn unpack_base(&self, base: &BaseImage, tree: &Path) -> Result<()> {
        self.archiver.unpack(&base.image, tree).await
    }

    /// Write a bootable image at `image` holding the contents of `tree`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be created or formatted.
    pub async fn image_from_tree(
        &self,
        base: &BaseImage,
        tree: &Path,
        image: &Path,
    ) -> Result<()> {
        self.create_sized(image).await?;
        self.formatter.format_tree(image, &base.bootloader, tree).await
    }

    /// Create `path` as a sparse file of the configured image size.
    async fn create_sized(&self, path: &Path) -> Result<()> {
        let file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.set_len(self.config.size_bytes())
            .await
            .with_context(|| format!("failed to size {}", path.display()))
    }

    /// Remove a build directory: recursively when it only ever held an
    /// unpacked tree, only if empty when it may still be a mount point.
    async fn clear_build_dir(&self, dir: &Path) {
        match self.population {
            Population::Archive => {
                if let Err(e) = remove_dir_all_if_exists(dir).await {
                    tracing::warn!(error = %e, "failed to remove build tree");
                }
            }
            Population::Mount => remove_dir_quietly(dir).await,
        }
    }

    /// Record metadata for the finished `partial` image, then move it onto
    /// `image`.
    async fn publish(
        &self,
        flavor: ImageFlavor,
        partial: &Path,
        image: &Path,
        manifest: PathBuf,
    ) -> Result<()> {
        let size_bytes = tokio::fs::metadata(partial)
            .await
            .with_context(|| format!("failed to stat {}", partial.display()))?
            .len();
        let meta = ImageMetadata {
            flavor,
            population: self.population,
            built_at: Utc::now(),
            size_bytes,
            manifest,
        };
        let json = serde_json::to_vec_pretty(&meta).context("failed to serialize metadata")?;
        self.write_staged(&self.layout.metadata(flavor, self.population), &json)
            .await?;
        tokio::fs::rename(partial, image)
            .await
            .with_context(|| format!("failed to publish {}", image.display()))
    }

    /// Write `bytes` next to `path` and rename them into place.
    async fn write_staged(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let staged = CacheLayout::staged(path, &self.build_id);
        let written = async {
            tokio::fs::write(&staged, bytes)
                .await
                .with_context(|| format!("failed to write {}", staged.display()))?;
            tokio::fs::rename(&staged, path)
                .await
                .with_context(|| format!("failed to publish {}", path.display()))
        }
        .await;
        if written.is_err() {
            if let Err(e) = remove_file_if_exists(&staged).await {
                tracing::warn!(error = %e, "failed to remove staged file");
            }
        }
        written
    }
}

/// What fills a fresh root tree.
enum RootSource {
    Manifest(PathBuf),
    /// Root archived by an earlier archive build.
    Archive(PathBuf),
}

async fn create_cache_dir(root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("failed to create {}", root.display()))
}

async fn remove_dir_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir(path).await {
        tracing::debug!(path = %path.display(), error = %e, "mount directory not removed");
    }
}
