//! Build configuration and project settings.
//!
//! [`ReleaseOptions`] is the raw invocation surface. It is turned into an
//! immutable [`BuildConfiguration`] exactly once, and that conversion is where
//! conflicting options are rejected. [`ProjectSettings`] carries the
//! repository layout and toolchain pins, read from an optional TOML file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ReleaseError;

/// Default settings file looked up in the working directory.
pub const SETTINGS_FILENAME: &str = "m8gd-release.toml";

/// Architectures built when a universal binary is requested.
pub const UNIVERSAL_ARCHS: &[&str] = &["x86_64", "arm64"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    Debug,
    Release,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    }

    /// Name of the GDExtension build variant, e.g. `template_release`.
    pub fn template_name(&self) -> String {
        format!("template_{}", self.as_str())
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildMode::Debug),
            "release" => Ok(BuildMode::Release),
            other => Err(ReleaseError::Configuration(format!(
                "unknown build mode '{other}'; expected 'debug' or 'release'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Windows,
    Linux,
    Macos,
}

impl Platform {
    /// Fixed order used when every platform is requested.
    pub const ALL: [Platform; 3] = [Platform::Windows, Platform::Linux, Platform::Macos];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Macos => "macos",
        }
    }

    /// Platform of the machine running the pipeline.
    pub fn host() -> Result<Self> {
        match std::env::consts::OS {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::Macos),
            other => Err(ReleaseError::Configuration(format!(
                "unsupported host operating system '{other}'"
            ))
            .into()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            "macos" | "osx" | "darwin" => Ok(Platform::Macos),
            other => Err(ReleaseError::Configuration(format!(
                "unknown platform '{other}'; expected windows, linux, macos or all"
            ))),
        }
    }
}

/// Which platforms a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPlatforms {
    /// Nothing requested: compile for whatever the build tool defaults to and
    /// export for the host platform.
    Host(Platform),
    Only(Platform),
    All,
}

impl TargetPlatforms {
    /// Platforms to export, in export order.
    pub fn export_platforms(&self) -> Vec<Platform> {
        match self {
            TargetPlatforms::Host(p) | TargetPlatforms::Only(p) => vec![*p],
            TargetPlatforms::All => Platform::ALL.to_vec(),
        }
    }

    /// Platforms passed explicitly to the build tool. `None` means "let the
    /// build tool decide".
    pub fn build_platforms(&self) -> Vec<Option<Platform>> {
        match self {
            TargetPlatforms::Host(_) => vec![None],
            TargetPlatforms::Only(p) => vec![Some(*p)],
            TargetPlatforms::All => Platform::ALL.iter().copied().map(Some).collect(),
        }
    }

    /// Concrete platform a build will produce, if known.
    pub fn resolved(&self, requested: Option<Platform>) -> Option<Platform> {
        match (requested, self) {
            (Some(p), _) => Some(p),
            (None, TargetPlatforms::Host(p)) => Some(*p),
            (None, _) => None,
        }
    }
}

/// Which pipeline phases run. Exactly one holds per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phases {
    ExtensionOnly,
    ExportOnly,
    Both,
}

impl Phases {
    pub fn builds_extension(&self) -> bool {
        matches!(self, Phases::ExtensionOnly | Phases::Both)
    }

    pub fn exports(&self) -> bool {
        matches!(self, Phases::ExportOnly | Phases::Both)
    }
}

/// Raw invocation options, before validation.
#[derive(Debug, Clone, Default)]
pub struct ReleaseOptions {
    pub target: Option<String>,
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub extension_only: bool,
    pub export_only: bool,
    pub dev: bool,
    pub full: bool,
    pub no_download: bool,
    pub osxcross_sdk: Option<String>,
}

/// Immutable configuration derived once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub build_mode: BuildMode,
    /// Modes compiled by the build phase. Usually just `build_mode`.
    pub build_modes: Vec<BuildMode>,
    pub target_platforms: TargetPlatforms,
    pub target_architectures: Vec<String>,
    pub phases: Phases,
    pub skip_downloads: bool,
    pub cross_sdk: Option<String>,
}

impl BuildConfiguration {
    pub fn from_options(options: &ReleaseOptions, host: Platform) -> Result<Self> {
        let mut extension_only = options.extension_only;
        let mut build_mode = match options.target.as_deref() {
            Some(value) => value.parse::<BuildMode>()?,
            None => BuildMode::Release,
        };

        if options.dev {
            build_mode = BuildMode::Debug;
            extension_only = true;
        }

        let phases = match (extension_only, options.export_only) {
            (true, true) => {
                return Err(ReleaseError::Configuration(
                    "--extension-only and --export-only are mutually exclusive".to_string(),
                )
                .into())
            }
            (true, false) => Phases::ExtensionOnly,
            (false, true) => Phases::ExportOnly,
            (false, false) => Phases::Both,
        };

        let target_platforms = match options.platform.as_deref().map(str::trim) {
            None | Some("") => TargetPlatforms::Host(host),
            Some(value) if value.eq_ignore_ascii_case("all") => TargetPlatforms::All,
            Some(value) => TargetPlatforms::Only(value.parse::<Platform>()?),
        };

        let target_architectures = parse_architectures(options.arch.as_deref())?;

        let build_modes = if options.full {
            vec![BuildMode::Debug, BuildMode::Release]
        } else {
            vec![build_mode]
        };

        let cross_sdk = options
            .osxcross_sdk
            .as_deref()
            .map(str::trim)
            .filter(|sdk| !sdk.is_empty())
            .map(str::to_string);

        Ok(Self {
            build_mode,
            build_modes,
            target_platforms,
            target_architectures,
            phases,
            skip_downloads: options.no_download,
            cross_sdk,
        })
    }

    /// Whether a build for `platform` fuses several architectures into one binary.
    pub fn is_universal(&self, platform: Option<Platform>) -> bool {
        self.cross_sdk.is_none()
            && self.target_platforms.resolved(platform) == Some(Platform::Macos)
            && self.target_architectures.len() > 1
    }
}

fn parse_architectures(value: Option<&str>) -> Result<Vec<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(Vec::new());
    };

    if value.eq_ignore_ascii_case("universal") {
        return Ok(UNIVERSAL_ARCHS.iter().map(|a| a.to_string()).collect());
    }

    let mut archs: Vec<String> = Vec::new();
    for arch in value.split(',').map(str::trim) {
        if arch.is_empty() {
            return Err(ReleaseError::Configuration(format!(
                "empty architecture in list '{value}'"
            ))
            .into());
        }
        if !archs.iter().any(|a| a == arch) {
            archs.push(arch.to_string());
        }
    }
    Ok(archs)
}

/// Repository layout and toolchain pins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectSettings {
    /// Name of the native module; also the prefix of exported archives.
    pub module: String,
    /// Directory the build tool runs in.
    pub source_dir: PathBuf,
    /// Godot project directory passed to `--path`.
    pub project_dir: PathBuf,
    /// Where the build tool writes shared libraries.
    pub library_dir: PathBuf,
    /// Output directory for downloads, staged libraries and archives.
    pub build_dir: PathBuf,
    pub godot_version: String,
    pub godot_channel: String,
    pub build_tool: String,
    pub merge_tool: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            module: "m8gd".to_string(),
            source_dir: PathBuf::from("."),
            project_dir: PathBuf::from("project"),
            library_dir: PathBuf::from("project/bin"),
            build_dir: PathBuf::from("build"),
            godot_version: "4.3".to_string(),
            godot_channel: "stable".to_string(),
            build_tool: "scons".to_string(),
            merge_tool: "lipo".to_string(),
        }
    }
}

impl ProjectSettings {
    /// Load settings from `path`, or defaults if `path` is `None` and no
    /// settings file exists in `root`. Relative paths resolve against `root`.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default_path = root.join(SETTINGS_FILENAME);
                if default_path.is_file() {
                    Self::read(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        settings.anchor(root);
        Ok(settings)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings '{}'", path.display()))?;
        let settings: ProjectSettings = toml::from_str(&contents)
            .with_context(|| format!("parsing settings '{}'", path.display()))?;
        if settings.module.trim().is_empty() {
            return Err(ReleaseError::Configuration(format!(
                "'module' must not be empty in '{}'",
                path.display()
            ))
            .into());
        }
        Ok(settings)
    }

    fn anchor(&mut self, root: &Path) {
        for dir in [
            &mut self.source_dir,
            &mut self.project_dir,
            &mut self.library_dir,
            &mut self.build_dir,
        ] {
            if dir.is_relative() {
                *dir = root.join(&*dir);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ReleaseOptions {
        ReleaseOptions::default()
    }

    #[test]
    fn defaults_build_and_export_release_for_host() {
        let config = BuildConfiguration::from_options(&options(), Platform::Linux).unwrap();
        assert_eq!(config.build_mode, BuildMode::Release);
        assert_eq!(config.build_modes, vec![BuildMode::Release]);
        assert_eq!(config.phases, Phases::Both);
        assert_eq!(config.target_platforms, TargetPlatforms::Host(Platform::Linux));
        assert!(config.target_architectures.is_empty());
        assert!(!config.skip_downloads);
    }

    #[test]
    fn extension_only_and_export_only_conflict() {
        let opts = ReleaseOptions {
            extension_only: true,
            export_only: true,
            ..options()
        };
        let err = BuildConfiguration::from_options(&opts, Platform::Linux).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::Configuration(_))
        ));
    }

    #[test]
    fn dev_conflicts_with_export_only() {
        let opts = ReleaseOptions {
            dev: true,
            export_only: true,
            ..options()
        };
        assert!(BuildConfiguration::from_options(&opts, Platform::Linux).is_err());
    }

    #[test]
    fn dev_is_debug_extension_only() {
        let opts = ReleaseOptions {
            dev: true,
            target: Some("release".to_string()),
            ..options()
        };
        let config = BuildConfiguration::from_options(&opts, Platform::Windows).unwrap();
        assert_eq!(config.build_mode, BuildMode::Debug);
        assert_eq!(config.phases, Phases::ExtensionOnly);
    }

    #[test]
    fn full_builds_both_modes() {
        let opts = ReleaseOptions {
            full: true,
            ..options()
        };
        let config = BuildConfiguration::from_options(&opts, Platform::Linux).unwrap();
        assert_eq!(config.build_modes, vec![BuildMode::Debug, BuildMode::Release]);
        assert_eq!(config.build_mode, BuildMode::Release);
    }

    #[test]
    fn universal_expands_to_fixed_pair() {
        let opts = ReleaseOptions {
            platform: Some("macos".to_string()),
            arch: Some("universal".to_string()),
            ..options()
        };
        let config = BuildConfiguration::from_options(&opts, Platform::Linux).unwrap();
        assert_eq!(config.target_architectures, vec!["x86_64", "arm64"]);
        assert!(config.is_universal(Some(Platform::Macos)));
        assert!(!config.is_universal(Some(Platform::Linux)));
    }

    #[test]
    fn cross_sdk_disables_universal_merge() {
        let opts = ReleaseOptions {
            platform: Some("macos".to_string()),
            arch: Some("x86_64,arm64".to_string()),
            osxcross_sdk: Some("darwin23".to_string()),
            ..options()
        };
        let config = BuildConfiguration::from_options(&opts, Platform::Linux).unwrap();
        assert!(!config.is_universal(Some(Platform::Macos)));
    }

    #[test]
    fn arch_list_is_deduplicated_in_order() {
        let archs = parse_architectures(Some("arm64, x86_64,arm64")).unwrap();
        assert_eq!(archs, vec!["arm64", "x86_64"]);
        assert!(parse_architectures(Some("arm64,,x86_64")).is_err());
    }

    #[test]
    fn all_platforms_export_in_fixed_order() {
        let opts = ReleaseOptions {
            platform: Some("ALL".to_string()),
            ..options()
        };
        let config = BuildConfiguration::from_options(&opts, Platform::Macos).unwrap();
        assert_eq!(
            config.target_platforms.export_platforms(),
            vec![Platform::Windows, Platform::Linux, Platform::Macos]
        );
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let opts = ReleaseOptions {
            platform: Some("haiku".to_string()),
            ..options()
        };
        assert!(BuildConfiguration::from_options(&opts, Platform::Linux).is_err());
    }

    #[test]
    fn settings_file_overrides_defaults_and_anchors_paths() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join(SETTINGS_FILENAME),
            "module = \"demo\"\nbuild_dir = \"out\"\ngodot_version = \"4.2\"\n",
        )
        .unwrap();

        let settings = ProjectSettings::load(temp.path(), None).unwrap();
        assert_eq!(settings.module, "demo");
        assert_eq!(settings.godot_version, "4.2");
        assert_eq!(settings.godot_channel, "stable");
        assert_eq!(settings.build_dir, temp.path().join("out"));
        assert_eq!(settings.project_dir, temp.path().join("project"));
    }

    #[test]
    fn settings_reject_unknown_keys() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "modul = \"typo\"\n").unwrap();
        assert!(ProjectSettings::load(temp.path(), Some(&path)).is_err());
    }
}
