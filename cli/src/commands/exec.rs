//! `guestrun exec` — run an executable inside a fresh guest.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::services::guest_run::{GuestRun, TeardownFailed};
use crate::application::services::preflight::{Requirements, check_host};
use crate::application::services::result_reporter::RunResult;
use crate::domain::config::HarnessConfig;
use crate::domain::exit_status::GuestStatus;
use crate::domain::image::ImageFlavor;
use crate::domain::payload::GuestPayload;
use crate::domain::vm_profile::VmProfile;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::emulator::QemuEmulator;
use crate::infra::probe::SystemProbe;
use crate::infra::signal;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the exec command.
#[derive(Args)]
#[command(trailing_var_arg = true)]
pub struct ExecArgs {
    /// Copy this folder into the guest (contents land in /root)
    #[arg(short, long)]
    pub folder: Option<PathBuf>,

    /// Boot the graphical image and keep a display attached
    #[arg(short, long)]
    pub gui: bool,

    /// Write the guest output to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Executable followed by its arguments
    #[arg(required = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Run the payload in a disposable guest and report its exit status.
///
/// The guest output is printed (or written to `--output`) whether the guest
/// succeeded or not. The returned exit code is the guest's own code, or
/// 125 when it could not be recovered.
///
/// # Errors
///
/// Returns an error if preflight, image preparation, the workspace or the
/// emulator fails, or if the run is interrupted.
pub async fn run(app: &AppContext, args: &ExecArgs) -> Result<ExitCode> {
    let Some((executable, arguments)) = args.command.split_first() else {
        anyhow::bail!("no executable given");
    };
    let payload = GuestPayload::new(executable, arguments.to_vec(), args.folder.clone())?;
    let config = HarnessConfig {
        guest: app.guest_config()?,
        ..app.config.clone()
    };
    let config = &config;

    let probe = SystemProbe::new(TokioCommandRunner::default());
    let needs = Requirements {
        emulator: true,
        folder_copy: args.folder.is_some(),
    };
    let host = check_host(&probe, config, needs).await?;

    let flavor = if args.gui {
        ImageFlavor::Gui
    } else {
        ImageFlavor::Base
    };
    let profile = VmProfile {
        cpus: config.emulator.cpus,
        memory_mb: config.emulator.memory_mb,
        kvm: host.kvm,
        gui: args.gui,
        overrides: config.emulator.extra_args.clone(),
    };

    let mounts = app.mount_controller();
    let catalog = app.image_catalog(host.population)?;
    let runner = TokioCommandRunner::default();
    let emulator = QemuEmulator::new(TokioCommandRunner::default(), &config.emulator.binary);
    let reporter = TerminalReporter::new(&app.output);
    let run_root = app.run_dir();

    let guest_run = GuestRun {
        catalog: &catalog,
        mounts: &mounts,
        emulator: &emulator,
        runner: &runner,
        reporter: &reporter,
        profile: &profile,
        guest: &config.guest,
        run_root: &run_root,
    };

    let result = match guest_run
        .run_guest(&payload, flavor, signal::interrupted())
        .await
    {
        Ok(result) => result,
        Err(e) => {
            reporter.abandon("run failed");
            if let Some(failed) = e.downcast_ref::<TeardownFailed>() {
                write_log(app, args, &failed.result).await?;
            }
            return Err(e);
        }
    };

    emit(app, args, &result).await?;
    Ok(exit_code(result.status))
}

async fn emit(app: &AppContext, args: &ExecArgs, result: &RunResult) -> Result<()> {
    write_log(app, args, result).await?;
    if app.is_json() {
        println!("{}", json::format_run_result(result)?);
    }

    match result.status {
        GuestStatus::Exited(0) => app.output.success("guest exited with code 0"),
        GuestStatus::Exited(code) => app.output.warn(&format!("guest exited with code {code}")),
        GuestStatus::Indeterminate => app.output.warn("indeterminate guest result"),
    }
    Ok(())
}

/// Write the guest output to `--output`, or to stdout outside JSON mode.
///
/// In JSON mode the log travels inside the single stdout document.
async fn write_log(app: &AppContext, args: &ExecArgs, result: &RunResult) -> Result<()> {
    if let Some(path) = &args.output {
        tokio::fs::write(path, &result.log)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
    } else if !app.is_json() {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(result.log.as_bytes())
            .and_then(|()| stdout.flush())
            .context("failed to write guest output")?;
    }
    Ok(())
}

/// Process exit code for a decoded guest status.
#[must_use]
pub fn exit_code(status: GuestStatus) -> ExitCode {
    ExitCode::from(u8::try_from(status.process_exit_code()).unwrap_or(u8::MAX))
}
