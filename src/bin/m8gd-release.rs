use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use m8gd_release::config::{BuildConfiguration, Platform, ProjectSettings, ReleaseOptions};
use m8gd_release::platform::host_profile;
use m8gd_release::process::SystemRunner;
use m8gd_release::toolchain::HttpFetcher;
use m8gd_release::Pipeline;

/// Build the m8gd GDExtension and export the Godot project
#[derive(Parser)]
#[command(name = "m8gd-release")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Build the debug or release variant
    #[arg(long, value_parser = ["debug", "release"])]
    target: Option<String>,

    /// Target platform: windows, linux, macos or all (default: host)
    #[arg(long)]
    platform: Option<String>,

    /// Target architecture, a comma-separated list, or "universal"
    #[arg(long)]
    arch: Option<String>,

    /// Only build the GDExtension (do not export)
    #[arg(long)]
    extension_only: bool,

    /// Only export, reusing already built libraries
    #[arg(long)]
    export_only: bool,

    /// Alias for "--extension-only --target debug"
    #[arg(long)]
    dev: bool,

    /// Build both debug and release variants of the GDExtension
    #[arg(long)]
    full: bool,

    /// Never download; fail if the Godot runtime or templates are missing
    #[arg(long)]
    nodownload: bool,

    /// Cross-compile for macOS with OSXCross using this SDK
    #[arg(long)]
    osxcross_sdk: Option<String>,

    /// Project settings file (default: ./m8gd-release.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> ReleaseOptions {
        ReleaseOptions {
            target: self.target.clone(),
            platform: self.platform.clone(),
            arch: self.arch.clone(),
            extension_only: self.extension_only,
            export_only: self.export_only,
            dev: self.dev,
            full: self.full,
            no_download: self.nodownload,
            osxcross_sdk: self.osxcross_sdk.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let host = Platform::host()?;
    let config = BuildConfiguration::from_options(&cli.options(), host)?;

    let root = std::env::current_dir().context("reading current directory")?;
    let settings = ProjectSettings::load(&root, cli.config.as_deref())?;

    let runner = SystemRunner::detect()?;
    let fetcher = HttpFetcher::new()?;
    let profile = host_profile()?;

    let report = Pipeline::new(&config, &settings, &runner, &fetcher, profile.as_ref()).run()?;
    if let Some(manifest) = report.manifest {
        println!(
            "The exported archives are in '{}' (manifest: {})",
            settings.build_dir.display(),
            manifest.display()
        );
    }
    Ok(())
}
