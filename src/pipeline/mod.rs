//! End-to-end release run.
//!
//! ```text
//! BuildConfiguration
//!     │
//!     ├── exports? ──► ArtifactResolver: export templates, Godot runtime
//!     ├── builds?  ──► preflight ──► NativeBuildDriver (mode × platform × arch)
//!     │                                  └── universal macOS? stage + assemble
//!     └── exports? ──► ExportOrchestrator ──► release-manifest.json
//! ```
//!
//! Every stage is fail-fast: the first error ends the run.

pub mod manifest;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::artifact::UniversalBinaryAssembler;
use crate::build::{BuildTarget, LibraryStager, NativeBuildDriver};
use crate::config::{BuildConfiguration, BuildMode, Platform, ProjectSettings, TargetPlatforms};
use crate::export::ExportOrchestrator;
use crate::platform::{profile_for, PlatformProfile};
use crate::preflight;
use crate::process::Runner;
use crate::toolchain::{ArtifactResolver, Fetcher, GodotRelease};

pub use manifest::{ArchiveRecord, ReleaseManifest, MANIFEST_FILENAME};

/// Paths the runtime needs for exporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub templates: PathBuf,
    pub runtime: PathBuf,
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub toolchain: Option<Toolchain>,
    pub built: Vec<BuildTarget>,
    pub universal: Vec<PathBuf>,
    pub archives: Vec<(Platform, PathBuf)>,
    pub manifest: Option<PathBuf>,
}

pub struct Pipeline<'a> {
    config: &'a BuildConfiguration,
    settings: &'a ProjectSettings,
    runner: &'a dyn Runner,
    fetcher: &'a dyn Fetcher,
    host: &'a dyn PlatformProfile,
    host_arch: String,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a BuildConfiguration,
        settings: &'a ProjectSettings,
        runner: &'a dyn Runner,
        fetcher: &'a dyn Fetcher,
        host: &'a dyn PlatformProfile,
    ) -> Self {
        Self {
            config,
            settings,
            runner,
            fetcher,
            host,
            host_arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Override the CPU architecture used to pick the runtime download.
    pub fn with_host_arch(mut self, arch: impl Into<String>) -> Self {
        self.host_arch = arch.into();
        self
    }

    pub fn run(&self) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();
        fs::create_dir_all(&self.settings.build_dir).with_context(|| {
            format!(
                "creating build directory '{}'",
                self.settings.build_dir.display()
            )
        })?;

        if self.config.phases.exports() {
            report.toolchain = Some(self.resolve_toolchain()?);
        }

        if self.config.phases.builds_extension() {
            self.build(&mut report)?;
        }

        if let Some(toolchain) = &report.toolchain {
            report.archives = self.export(&toolchain.runtime)?;
            let manifest = ReleaseManifest::collect(
                self.config.build_mode,
                &self.release().templates_dir_name(),
                &report.archives,
            )?;
            report.manifest = Some(manifest.write(&self.settings.build_dir)?);
        }

        println!("Done!");
        Ok(report)
    }

    fn release(&self) -> GodotRelease {
        GodotRelease::new(&self.settings.godot_version, &self.settings.godot_channel)
    }

    /// Resolve the export templates and the Godot runtime.
    pub fn resolve_toolchain(&self) -> Result<Toolchain> {
        let release = self.release();
        let resolver = ArtifactResolver::new(self.runner, self.fetcher, &self.settings.build_dir);
        let allow_download = !self.config.skip_downloads;

        let templates = resolver.resolve(&release.export_templates(self.host)?, allow_download)?;
        println!("Found export templates: {}", templates.display());

        let runtime = resolver.resolve(
            &release.runtime(self.host, &self.host_arch, &self.settings.build_dir)?,
            allow_download,
        )?;
        println!("Found godot: {}", runtime.display());

        Ok(Toolchain { templates, runtime })
    }

    fn build(&self, report: &mut PipelineReport) -> Result<()> {
        preflight::check_build_host(self.runner, self.config, self.settings)?;
        println!("Compiling {} extension...", self.settings.module);

        let driver =
            NativeBuildDriver::new(self.runner, self.settings, self.config.cross_sdk.clone());
        let targets = BuildTarget::sequence(self.config);
        for group in targets.chunk_by(|a, b| a.mode == b.mode && a.platform == b.platform) {
            let (mode, platform) = (group[0].mode, group[0].platform);
            if self.config.is_universal(platform) {
                let universal = self.build_universal(&driver, mode, group, report)?;
                report.universal.push(universal);
                continue;
            }
            driver.build_all(group)?;
            report.built.extend_from_slice(group);
        }
        Ok(())
    }

    fn build_universal(
        &self,
        driver: &NativeBuildDriver,
        mode: BuildMode,
        targets: &[BuildTarget],
        report: &mut PipelineReport,
    ) -> Result<PathBuf> {
        let macos = profile_for(Platform::Macos);
        let stager = LibraryStager::new(
            &self.settings.module,
            Platform::Macos,
            macos.shared_library_suffix(),
            &self.settings.library_dir,
            &self.settings.build_dir,
        );
        for target in targets {
            driver.build_staged(target, &stager)?;
            report.built.push(target.clone());
        }

        let assembler = UniversalBinaryAssembler::new(
            self.runner,
            &self.settings.merge_tool,
            &self.settings.module,
            &self.settings.library_dir,
        );
        assembler.assemble(
            Platform::Macos,
            mode,
            &self.config.target_architectures,
            &stager,
        )
    }

    fn export(&self, runtime: &Path) -> Result<Vec<(Platform, PathBuf)>> {
        println!("Exporting Godot project...");
        let exporter =
            ExportOrchestrator::new(self.runner, self.settings, self.config.cross_sdk.clone());
        let mode = self.config.build_mode;

        let platforms = self.config.target_platforms.export_platforms();
        let paths = match self.config.target_platforms {
            TargetPlatforms::All => exporter.export_all(runtime, mode)?,
            _ => exporter.export_each(runtime, mode, &platforms)?,
        };

        let mut archives: Vec<(Platform, PathBuf)> = platforms
            .into_iter()
            .map(|p| exporter.effective_platform(p))
            .zip(paths)
            .collect();
        archives.dedup();
        info!(count = archives.len(), "export complete");
        Ok(archives)
    }
}
