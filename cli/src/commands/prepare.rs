//! `guestrun prepare` — build the cached bootloader and base images ahead of
//! the first run.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::preflight::{Requirements, check_host};
use crate::domain::error::RunError;
use crate::domain::image::{ImageFlavor, ImageMetadata};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::probe::SystemProbe;
use crate::infra::signal;
use crate::output::reporter::TerminalReporter;

/// Arguments for the prepare command.
#[derive(Args)]
pub struct PrepareArgs {
    /// Image flavor to build (base or gui)
    #[arg(long, default_value = "base", conflicts_with = "all")]
    pub flavor: ImageFlavor,

    /// Build every flavor
    #[arg(long)]
    pub all: bool,
}

/// Build the requested images (no-op for images already cached) and show
/// their metadata.
///
/// # Errors
///
/// Returns an error if preflight or a build fails, or on interruption.
pub async fn run(app: &AppContext, args: &PrepareArgs) -> Result<ExitCode> {
    let probe = SystemProbe::new(TokioCommandRunner::default());
    let host = check_host(&probe, &app.config, Requirements::default()).await?;

    let flavors: Vec<ImageFlavor> = if args.all {
        ImageFlavor::ALL.to_vec()
    } else {
        vec![args.flavor]
    };

    let mounts = app.mount_controller();
    let catalog = app.image_catalog(host.population)?;
    let reporter = TerminalReporter::new(&app.output);
    let interrupt = signal::interrupted();
    tokio::pin!(interrupt);

    let mut built: Vec<ImageMetadata> = Vec::new();
    for flavor in flavors {
        tokio::select! {
            image = catalog.ensure_base_image(flavor, &mounts, &reporter) => {
                if let Err(e) = image {
                    reporter.abandon(&format!("{flavor} image failed"));
                    return Err(e);
                }
            }
            () = &mut interrupt => {
                reporter.abandon("interrupted");
                catalog.discard_partial(flavor, &mounts).await?;
                return Err(RunError::Interrupted.into());
            }
        }
        if let Some(meta) = catalog.metadata(flavor).await? {
            built.push(meta);
        }
    }

    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(&built)?);
    } else {
        app.output.header(&format!("cache: {}", catalog.layout().root().display()));
        for meta in &built {
            app.output.kv("flavor", meta.flavor.as_str());
            app.output.kv("population", meta.population.as_str());
            app.output.kv("built", &meta.built_at.to_rfc3339());
            app.output.kv("size", &format!("{} MiB", meta.size_bytes / (1024 * 1024)));
            app.output.kv("manifest", &meta.manifest.display().to_string());
        }
    }
    Ok(ExitCode::SUCCESS)
}
