use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use iso_remaster::pipeline::BuildReport;
use iso_remaster::{
    BuildConfig, ChrootExecutor, HostTools, Pipeline, PipelineError, WgetFetcher,
};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Remaster a live ISO from dependencies.yml, setup.yml and files/
#[derive(Parser)]
#[command(name = "iso-remaster")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Keep the extracted image tree and root filesystem after the build
    #[arg(long)]
    keep: bool,

    /// Build configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for the cached base image, working trees and build.iso
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Directory holding dependencies.yml, setup.yml and files/
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Base image to download
    #[arg(long, value_name = "URL")]
    iso_url: Option<String>,

    /// Skip host tool and privilege checks
    #[arg(long)]
    skip_preflight: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .without_time()
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = build_config(&cli)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&interrupted))
            .with_context(|| format!("registering handler for signal {signal}"))?;
    }

    info!("=== ISO Customization Builder ===");
    if cli.keep {
        info!("will keep extracted files after build");
    } else {
        info!("will clean extracted files after build (use --keep to preserve)");
    }

    let tools = HostTools::new(config.squashfs.clone());
    let pipeline = Pipeline::new(config, &ChrootExecutor, &WgetFetcher, &tools)
        .with_interrupt_flag(interrupted);

    let result = pipeline.run(cli.keep);
    let (code, message) = conclusion(&result);
    if code == 0 {
        info!("=== Build Complete! ===");
        info!("{message}");
    } else {
        error!("{message}");
    }
    Ok(code)
}

/// Exit code and final message for a finished pipeline run.
fn conclusion(result: &Result<BuildReport, PipelineError>) -> (i32, String) {
    match result {
        Ok(report) => (
            0,
            format!("Your customized ISO is ready: {}", report.output_image.display()),
        ),
        Err(e) if e.is_interrupt() => (1, "Build interrupted by user".to_string()),
        Err(e) => (1, format!("Build failed: {e}")),
    }
}

fn build_config(cli: &Cli) -> Result<BuildConfig> {
    let mut config = match &cli.config {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(dir) = &cli.project_dir {
        config.project_dir = dir.clone();
    }
    if let Some(url) = &cli.iso_url {
        config.iso_url = url.clone();
    }
    if cli.skip_preflight {
        config.preflight = false;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use iso_remaster::fetch::FetchOutcome;
    use iso_remaster::stages::s05_setup::SetupSummary;
    use iso_remaster::Stage;

    #[test]
    fn test_success_exits_zero() {
        let report = BuildReport {
            fetch: FetchOutcome::AlreadyPresent,
            setup: SetupSummary::default(),
            output_image: PathBuf::from("/out/build.iso"),
        };
        let (code, message) = conclusion(&Ok(report));
        assert_eq!(code, 0);
        assert!(message.ends_with("/out/build.iso"));
    }

    #[test]
    fn test_interrupt_and_failure_exit_one_with_distinct_messages() {
        let (code, message) = conclusion(&Err(PipelineError::Interrupted {
            stage: Stage::Setup,
        }));
        assert_eq!(code, 1);
        assert_eq!(message, "Build interrupted by user");

        let (code, message) = conclusion(&Err(PipelineError::StageFailed {
            stage: Stage::Repack,
            source: anyhow!("mksquashfs exited with 1"),
        }));
        assert_eq!(code, 1);
        assert!(message.starts_with("Build failed: "));
        assert!(message.contains("mksquashfs exited with 1"));
    }
}
