//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports` — never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

mod fs_ops;

pub mod guest_run;
pub mod image_catalog;
pub mod mount_controller;
pub mod payload;
pub mod preflight;
pub mod result_reporter;
pub mod vm_runner;
pub mod workspace;
