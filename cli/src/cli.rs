//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::app::{AppContext, AppFlags, EmulatorOverrides, OutputFlags};
use crate::commands;
use crate::infra::config::YamlConfigStore;

/// Run host-built binaries inside a disposable guest VM
#[derive(Parser)]
#[command(
    name = "guestrun",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Emulator binary to launch
    #[arg(long, global = true, env = "GUESTRUN_QEMU_BINARY")]
    pub qemu_binary: Option<String>,

    /// Extra emulator flags, replacing defaults flag by flag
    #[arg(long, global = true, env = "GUESTRUN_QEMU_ARGS", allow_hyphen_values = true)]
    pub qemu_args: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an executable inside a fresh guest
    Exec(commands::exec::ExecArgs),

    /// Build the cached bootloader and base images
    Prepare(commands::prepare::PrepareArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            verbose: _,
            qemu_binary,
            qemu_args,
            command,
        } = self;

        if let Command::Version = command {
            commands::version::run(json);
            return Ok(ExitCode::SUCCESS);
        }

        let flags = AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            emulator: EmulatorOverrides {
                binary: qemu_binary,
                args: qemu_args,
            },
        };
        let app = AppContext::new(&flags, &YamlConfigStore)?;

        match command {
            Command::Exec(args) => commands::exec::run(&app, &args).await,
            Command::Prepare(args) => commands::prepare::run(&app, &args).await,
            Command::Version => Ok(ExitCode::SUCCESS),
        }
    }
}
