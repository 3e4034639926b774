//! Native compilation of the GDExtension module.
//!
//! - [`NativeBuildDriver`] - runs the build tool once per [`BuildTarget`]
//! - [`staging`] - copies per-architecture outputs to deterministic names

pub mod staging;

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::config::{BuildConfiguration, BuildMode, Platform, ProjectSettings};
use crate::error::ReleaseError;
use crate::process::{Cmd, Runner};

pub use staging::{library_file_name, LibraryStager};

/// Platform and architecture forced by a cross-SDK override.
pub const CROSS_PLATFORM: Platform = Platform::Macos;
pub const CROSS_ARCH: &str = "x86_64";

/// One (mode, platform, architecture) combination.
///
/// `None` leaves the choice to the build tool's own default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub mode: BuildMode,
    pub platform: Option<Platform>,
    pub arch: Option<String>,
}

impl BuildTarget {
    pub fn new(mode: BuildMode, platform: Option<Platform>, arch: Option<&str>) -> Self {
        Self {
            mode,
            platform,
            arch: arch.map(str::to_string),
        }
    }

    /// Targets of `config` in build order: mode, then platform, then arch.
    pub fn sequence(config: &BuildConfiguration) -> Vec<BuildTarget> {
        let archs: Vec<Option<&str>> = if config.target_architectures.is_empty() {
            vec![None]
        } else {
            config.target_architectures.iter().map(|a| Some(a.as_str())).collect()
        };

        let mut targets = Vec::new();
        for mode in &config.build_modes {
            for platform in config.target_platforms.build_platforms() {
                for arch in &archs {
                    targets.push(BuildTarget::new(*mode, platform, *arch));
                }
            }
        }
        targets
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode.template_name())?;
        if let Some(platform) = self.platform {
            write!(f, " {platform}")?;
        }
        if let Some(arch) = &self.arch {
            write!(f, " {arch}")?;
        }
        Ok(())
    }
}

/// Drives the external build tool (SCons) for each target.
pub struct NativeBuildDriver<'a> {
    runner: &'a dyn Runner,
    tool: String,
    source_dir: PathBuf,
    cross_sdk: Option<String>,
}

impl<'a> NativeBuildDriver<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        settings: &ProjectSettings,
        cross_sdk: Option<String>,
    ) -> Self {
        Self {
            runner,
            tool: settings.build_tool.clone(),
            source_dir: settings.source_dir.clone(),
            cross_sdk,
        }
    }

    /// The build tool invocation for `target`.
    ///
    /// A cross SDK replaces the target's platform and architecture.
    pub fn command_for(&self, target: &BuildTarget) -> Cmd {
        let cmd = Cmd::new(&self.tool)
            .arg(format!("target={}", target.mode.template_name()))
            .current_dir(&self.source_dir);

        if let Some(sdk) = &self.cross_sdk {
            return cmd
                .arg(format!("platform={CROSS_PLATFORM}"))
                .arg(format!("arch={CROSS_ARCH}"))
                .arg(format!("osxcross_sdk={sdk}"));
        }

        let cmd = match target.platform {
            Some(platform) => cmd.arg(format!("platform={platform}")),
            None => cmd,
        };
        match &target.arch {
            Some(arch) => cmd.arg(format!("arch={arch}")),
            None => cmd,
        }
    }

    /// Compile one target. A non-zero exit is a [`ReleaseError::Build`].
    pub fn build(&self, target: &BuildTarget) -> Result<()> {
        println!("Compiling {target}...");
        let cmd = self.command_for(target);
        let result = self.runner.run(&cmd)?;
        if !result.success() {
            return Err(ReleaseError::Build {
                target: target.to_string(),
                command: cmd.display(),
                code: result.exit_description(),
            }
            .into());
        }
        info!(target = %target, "compiled");
        Ok(())
    }

    /// Compile `targets` in order, stopping at the first failure.
    pub fn build_all(&self, targets: &[BuildTarget]) -> Result<()> {
        for target in targets {
            self.build(target)?;
        }
        Ok(())
    }

    /// Compile `target` and copy its shared library to the staging name.
    pub fn build_staged(&self, target: &BuildTarget, stager: &LibraryStager) -> Result<PathBuf> {
        let before = stager.snapshot()?;
        self.build(target)?;
        stager.stage(target, &before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReleaseOptions, TargetPlatforms};
    use crate::testutil::RecordingRunner;

    fn settings() -> ProjectSettings {
        ProjectSettings {
            source_dir: PathBuf::from("/src/m8gd"),
            ..ProjectSettings::default()
        }
    }

    #[test]
    fn command_carries_mode_platform_and_arch() {
        let runner = RecordingRunner::new();
        let driver = NativeBuildDriver::new(&runner, &settings(), None);
        let cmd = driver.command_for(&BuildTarget::new(
            BuildMode::Debug,
            Some(Platform::Macos),
            Some("arm64"),
        ));
        assert_eq!(
            cmd.display(),
            "scons target=template_debug platform=macos arch=arm64"
        );
        assert_eq!(cmd.get_current_dir(), Some(PathBuf::from("/src/m8gd").as_path()));
    }

    #[test]
    fn unset_fields_are_left_to_the_build_tool() {
        let runner = RecordingRunner::new();
        let driver = NativeBuildDriver::new(&runner, &settings(), None);
        let cmd = driver.command_for(&BuildTarget::new(BuildMode::Release, None, None));
        assert_eq!(cmd.display(), "scons target=template_release");
    }

    #[test]
    fn cross_sdk_overrides_platform_and_arch() {
        let runner = RecordingRunner::new();
        let driver = NativeBuildDriver::new(&runner, &settings(), Some("darwin23".to_string()));
        let cmd = driver.command_for(&BuildTarget::new(
            BuildMode::Release,
            Some(Platform::Windows),
            Some("arm64"),
        ));
        assert_eq!(
            cmd.display(),
            "scons target=template_release platform=macos arch=x86_64 osxcross_sdk=darwin23"
        );
    }

    #[test]
    fn sequence_orders_mode_platform_arch() {
        let options = ReleaseOptions {
            platform: Some("all".to_string()),
            arch: Some("x86_64,arm64".to_string()),
            full: true,
            ..Default::default()
        };
        let config = BuildConfiguration::from_options(&options, Platform::Linux).unwrap();
        assert_eq!(config.target_platforms, TargetPlatforms::All);

        let targets = BuildTarget::sequence(&config);
        assert_eq!(targets.len(), 2 * 3 * 2);
        assert_eq!(
            targets[0],
            BuildTarget::new(BuildMode::Debug, Some(Platform::Windows), Some("x86_64"))
        );
        assert_eq!(
            targets[1],
            BuildTarget::new(BuildMode::Debug, Some(Platform::Windows), Some("arm64"))
        );
        assert_eq!(targets[6].mode, BuildMode::Release);
    }

    #[test]
    fn failing_target_stops_the_sequence() {
        let targets: Vec<BuildTarget> = ["x86_64", "arm64", "x86_32", "rv64"]
            .iter()
            .map(|arch| BuildTarget::new(BuildMode::Release, Some(Platform::Linux), Some(*arch)))
            .collect();
        let runner = RecordingRunner::new().fail_on("arch=x86_32", 2);
        let driver = NativeBuildDriver::new(&runner, &settings(), None);

        let err = driver.build_all(&targets).unwrap_err();

        assert_eq!(runner.count("arch=x86_64"), 1);
        assert_eq!(runner.count("arch=arm64"), 1);
        assert_eq!(runner.count("arch=x86_32"), 1);
        assert_eq!(runner.count("arch=rv64"), 0);
        match err.downcast_ref::<ReleaseError>() {
            Some(ReleaseError::Build { command, code, .. }) => {
                assert!(command.contains("arch=x86_32"));
                assert_eq!(code, "exit code 2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn all_targets_succeed() {
        let targets = vec![
            BuildTarget::new(BuildMode::Debug, None, None),
            BuildTarget::new(BuildMode::Release, None, None),
        ];
        let runner = RecordingRunner::new();
        NativeBuildDriver::new(&runner, &settings(), None)
            .build_all(&targets)
            .unwrap();
        assert_eq!(
            runner.lines(),
            vec!["scons target=template_debug", "scons target=template_release"]
        );
    }
}
