//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, mount
//! daemons and the host mount table, image tooling, root archives, the
//! emulator, host probing, signal handling and configuration loading.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod archive;
pub mod command_runner;
pub mod config;
pub mod emulator;
pub mod installer;
pub mod mount;
pub mod probe;
pub mod signal;
