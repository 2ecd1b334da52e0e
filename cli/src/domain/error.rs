//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::path::PathBuf;

use thiserror::Error;

// ── Image errors ──────────────────────────────────────────────────────────────

/// Failures while building the cached bootloader or base image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("installer failed for manifest {manifest}: {detail}")]
    InstallerFailed { manifest: PathBuf, detail: String },

    #[error("formatting {image} failed: {detail}")]
    FormatFailed { image: PathBuf, detail: String },

    #[error("installer did not produce {0}")]
    MissingArtifact(PathBuf),

    #[error("archive {archive} failed: {detail}")]
    ArchiveFailed { archive: PathBuf, detail: String },
}

// ── Mount errors ──────────────────────────────────────────────────────────────

/// Failures of the loopback mount state machine.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("mounting {image} at {dir} failed: {reason}")]
    MountFailure {
        image: PathBuf,
        dir: PathBuf,
        reason: String,
    },

    #[error("{dir} is still mounted after unmount request")]
    UnmountFailure { dir: PathBuf },
}

// ── Preflight errors ──────────────────────────────────────────────────────────

/// Host capabilities missing before any run is attempted.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{program} not found, please install {hint} before continuing")]
    MissingProgram { program: String, hint: String },

    #[error("FUSE is not available ({device} missing)")]
    NoFuse { device: String },
}

// ── Run errors ────────────────────────────────────────────────────────────────

/// Errors raised by the run pipeline itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("run interrupted")]
    Interrupted,

    #[error("payload executable {0} is not a file")]
    PayloadNotFound(PathBuf),

    #[error("payload path {0} has no file name")]
    PayloadWithoutName(PathBuf),

    #[error("payload argument {0:?} contains a line break")]
    ArgumentContainsNewline(String),

    #[error("guest runner {0} is not a file; build guestrund for the guest target")]
    RunnerNotFound(PathBuf),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}\n\nExpected: {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}
