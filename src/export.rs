//! Headless packaging of the Godot project into per-platform archives.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::artifact::filesystem::remove_path;
use crate::config::{BuildMode, Platform, ProjectSettings};
use crate::error::ReleaseError;
use crate::process::{Cmd, Runner};

pub struct ExportOrchestrator<'a> {
    runner: &'a dyn Runner,
    module: String,
    project_dir: PathBuf,
    build_dir: PathBuf,
    cross_sdk: Option<String>,
}

impl<'a> ExportOrchestrator<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        settings: &ProjectSettings,
        cross_sdk: Option<String>,
    ) -> Self {
        Self {
            runner,
            module: settings.module.clone(),
            project_dir: settings.project_dir.clone(),
            build_dir: settings.build_dir.clone(),
            cross_sdk,
        }
    }

    /// Platform actually exported when `platform` is requested.
    ///
    /// A cross SDK means only the macOS build exists, so every export is
    /// redirected to the macOS preset.
    pub fn effective_platform(&self, platform: Platform) -> Platform {
        if self.cross_sdk.is_some() {
            Platform::Macos
        } else {
            platform
        }
    }

    /// Archive written for `platform`.
    pub fn archive_path(&self, platform: Platform) -> PathBuf {
        self.build_dir.join(format!(
            "{}_{}.zip",
            self.module,
            self.effective_platform(platform)
        ))
    }

    pub fn command_for(&self, runtime: &Path, mode: BuildMode, platform: Platform) -> Result<Cmd> {
        let preset = self.effective_platform(platform);
        // The runtime runs inside the project directory.
        let archive = std::path::absolute(self.archive_path(platform))
            .context("resolving export archive path")?;
        Ok(Cmd::from_path(runtime)
            .arg("--headless")
            .arg("--path")
            .arg_path(&self.project_dir)
            .arg(format!("--export-{mode}"))
            .arg(preset.as_str())
            .arg_path(&archive)
            .current_dir(&self.project_dir))
    }

    /// Export one platform archive and return its path.
    pub fn export(&self, runtime: &Path, mode: BuildMode, platform: Platform) -> Result<PathBuf> {
        let preset = self.effective_platform(platform);
        println!("Exporting {preset} ({mode})...");

        let archive = self.archive_path(platform);
        std::fs::create_dir_all(&self.build_dir).with_context(|| {
            format!("creating build directory '{}'", self.build_dir.display())
        })?;
        // A stale archive would hide an export that wrote nothing.
        remove_path(&archive)?;

        let cmd = self.command_for(runtime, mode, platform)?;
        let result = self.runner.run(&cmd)?;
        if !result.success() {
            return Err(ReleaseError::Export {
                platform: preset.to_string(),
                reason: format!("`{}` exited with {}", cmd.display(), result.exit_description()),
            }
            .into());
        }
        if !archive.is_file() {
            return Err(ReleaseError::Export {
                platform: preset.to_string(),
                reason: format!(
                    "`{}` succeeded but wrote no '{}'",
                    cmd.display(),
                    archive.display()
                ),
            }
            .into());
        }

        info!(platform = %preset, archive = %archive.display(), "exported");
        Ok(archive)
    }

    /// Export `platforms` in order, stopping at the first failure.
    pub fn export_each(
        &self,
        runtime: &Path,
        mode: BuildMode,
        platforms: &[Platform],
    ) -> Result<Vec<PathBuf>> {
        platforms
            .iter()
            .map(|platform| self.export(runtime, mode, *platform))
            .collect()
    }

    /// Export windows, linux and macos in that order.
    pub fn export_all(&self, runtime: &Path, mode: BuildMode) -> Result<Vec<PathBuf>> {
        self.export_each(runtime, mode, &Platform::ALL)
    }
}
