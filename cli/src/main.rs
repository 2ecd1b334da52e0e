//! guestrun - run host-built binaries inside a disposable guest VM

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use guestrun_cli::application::services::guest_run::TeardownFailed;
use guestrun_cli::cli::Cli;
use guestrun_cli::domain::error::RunError;
use guestrun_cli::output::json;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "GUESTRUN_LOG";

/// Exit code for failures of the harness itself.
const HARNESS_FAILURE: u8 = 126;

/// Exit code after SIGINT/SIGTERM, as shells report it.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = cli.json;

    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            let interrupted = matches!(e.downcast_ref::<RunError>(), Some(RunError::Interrupted));
            let code = if interrupted { "interrupted" } else { "harness_error" };
            let log = e
                .downcast_ref::<TeardownFailed>()
                .map(|failed| failed.result.log.as_str());
            match json::format_error(&format!("{e:#}"), code, log) {
                Ok(doc) if json_mode => println!("{doc}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(if interrupted {
                INTERRUPTED
            } else {
                HARNESS_FAILURE
            })
        }
    }
}

/// Logs go to stderr; stdout carries guest output.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = if verbose > 0 {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
