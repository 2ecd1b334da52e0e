//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod error;
pub mod exit_status;
pub mod guest_log;
pub mod image;
pub mod mount_table;
pub mod payload;
pub mod vm_profile;
pub mod workspace;

pub use config::{HarnessConfig, validate_config};
pub use error::{ConfigError, ImageError, MountError, PreflightError, RunError};
pub use exit_status::{GuestStatus, decode_exit_status};
pub use guest_log::extract_payload_output;
pub use image::{BaseImage, CacheLayout, ImageFlavor, ImageMetadata, ManifestKind};
pub use mount_table::{MountEntry, MountState};
pub use payload::{GuestPayload, render_manifest};
pub use vm_profile::{VmProfile, merge_emulator_args};
pub use workspace::{RunId, WorkspacePaths};
