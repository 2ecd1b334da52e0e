//! Application service — turns a finished run into a `RunResult`.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::exit_status::GuestStatus;
use crate::domain::guest_log::extract_payload_output;
use crate::domain::workspace::WorkspacePaths;

/// Outcome of one guest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub status: GuestStatus,
    pub log: String,
}

/// Read the run's debug log and pair the payload output with `status`.
///
/// A missing log yields empty output; invalid UTF-8 is replaced.
///
/// # Errors
///
/// Returns an error if the log exists but cannot be read.
pub async fn report(paths: &WorkspacePaths, status: GuestStatus) -> Result<RunResult> {
    let bytes = match tokio::fs::read(&paths.log).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(log = %paths.log.display(), "guest log missing");
            Vec::new()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", paths.log.display()));
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    Ok(RunResult {
        status,
        log: extract_payload_output(&text),
    })
}
