//! JSON output helpers.
//!
//! `--json` prints exactly one document on stdout: the run result on
//! success, or an error object when the harness itself failed.

use anyhow::{Context, Result};

use crate::application::services::result_reporter::RunResult;
use crate::domain::exit_status::GuestStatus;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// A `"log"` field is added when the guest ran before the harness failed.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str, log: Option<&str>) -> Result<String> {
    let mut obj = serde_json::json!({
        "error": true,
        "message": message,
        "code": code,
    });
    if let Some(log) = log {
        obj["log"] = serde_json::Value::from(log);
    }
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Format a finished run.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "status": "exited",
///   "exit_code": 0,
///   "log": "..."
/// }
/// ```
///
/// `status` is `"indeterminate"` with `exit_code` -1 when the emulator did
/// not report through the debug-exit device.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_run_result(result: &RunResult) -> Result<String> {
    let status = match result.status {
        GuestStatus::Exited(_) => "exited",
        GuestStatus::Indeterminate => "indeterminate",
    };
    let obj = serde_json::json!({
        "status": status,
        "exit_code": result.status.code(),
        "log": result.log,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}
