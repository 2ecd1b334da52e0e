//! Tar archives of guest root trees.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::Archiver;
use crate::domain::error::ImageError;

/// Uncompressed tar archives written and read with the `tar` crate on the
/// blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarArchiver;

fn pack_blocking(tree: &Path, archive: &Path) -> std::io::Result<()> {
    let file = File::create(archive)?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", tree)?;
    builder.into_inner()?.sync_all()
}

fn unpack_blocking(archive: &Path, tree: &Path) -> std::io::Result<()> {
    let mut tar = tar::Archive::new(File::open(archive)?);
    tar.set_preserve_permissions(true);
    tar.set_preserve_mtime(true);
    tar.set_overwrite(true);
    tar.unpack(tree)
}

async fn blocking(
    archive: &Path,
    op: impl FnOnce() -> std::io::Result<()> + Send + 'static,
) -> Result<()> {
    tokio::task::spawn_blocking(op)
        .await
        .context("archive task panicked")?
        .map_err(|e| {
            ImageError::ArchiveFailed {
                archive: archive.to_path_buf(),
                detail: e.to_string(),
            }
            .into()
        })
}

impl Archiver for TarArchiver {
    async fn pack(&self, tree: &Path, archive: &Path) -> Result<()> {
        tracing::info!(tree = %tree.display(), archive = %archive.display(), "packing");
        let (src, dest): (PathBuf, PathBuf) = (tree.to_path_buf(), archive.to_path_buf());
        blocking(archive, move || pack_blocking(&src, &dest)).await
    }

    async fn unpack(&self, archive: &Path, tree: &Path) -> Result<()> {
        tracing::info!(archive = %archive.display(), tree = %tree.display(), "unpacking");
        let (src, dest): (PathBuf, PathBuf) = (archive.to_path_buf(), tree.to_path_buf());
        blocking(archive, move || unpack_blocking(&src, &dest)).await
    }
}
