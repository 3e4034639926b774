//! Per-OS conventions, selected once at startup.
//!
//! Everything that differs between Windows, Linux and macOS (shared library
//! naming, where Godot keeps its export templates, which runtime archive to
//! download) lives behind [`PlatformProfile`] so the rest of the pipeline
//! never matches on an OS name.

use anyhow::Result;
use std::fmt::Debug;
use std::path::PathBuf;

use crate::config::Platform;
use crate::error::ReleaseError;
use crate::toolchain::GodotRelease;

/// Where a downloaded Godot editor lands inside its archive and the build dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Archive filename on the release server.
    pub archive: String,
    /// Top-level entry of the extracted archive that gets installed.
    pub entry: PathBuf,
    /// Executable, relative to the installed entry's parent directory.
    pub binary: PathBuf,
}

pub trait PlatformProfile: Debug + Send + Sync {
    fn platform(&self) -> Platform;

    /// Extension of shared libraries, including the leading dot.
    fn shared_library_suffix(&self) -> &'static str;

    /// Extension of executables, including the leading dot (empty on POSIX).
    fn executable_suffix(&self) -> &'static str;

    /// Godot's user data directory (the parent of `export_templates/`).
    fn godot_data_dir(&self) -> Result<PathBuf>;

    /// Editor archive for this host and CPU architecture.
    fn runtime_layout(&self, release: &GodotRelease, arch: &str) -> Result<RuntimeLayout>;

    /// Directory export templates for `release` are installed into.
    fn export_templates_dir(&self, release: &GodotRelease) -> Result<PathBuf> {
        Ok(self
            .godot_data_dir()?
            .join("export_templates")
            .join(release.templates_dir_name()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsProfile;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxProfile;

#[derive(Debug, Clone, Copy, Default)]
pub struct MacosProfile;

impl PlatformProfile for WindowsProfile {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn shared_library_suffix(&self) -> &'static str {
        ".dll"
    }

    fn executable_suffix(&self) -> &'static str {
        ".exe"
    }

    // %APPDATA%\Godot
    fn godot_data_dir(&self) -> Result<PathBuf> {
        Ok(data_dir()?.join("Godot"))
    }

    fn runtime_layout(&self, release: &GodotRelease, arch: &str) -> Result<RuntimeLayout> {
        let flavor = match arch {
            "x86_64" => "win64",
            "x86" => "win32",
            other => return Err(unsupported_host_arch(self.platform(), other)),
        };
        let exe = format!("{}_{}.exe", release.file_stem(), flavor);
        Ok(RuntimeLayout {
            archive: format!("{exe}.zip"),
            entry: PathBuf::from(&exe),
            binary: PathBuf::from(exe),
        })
    }
}

impl PlatformProfile for LinuxProfile {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn shared_library_suffix(&self) -> &'static str {
        ".so"
    }

    fn executable_suffix(&self) -> &'static str {
        ""
    }

    // ~/.local/share/godot
    fn godot_data_dir(&self) -> Result<PathBuf> {
        Ok(data_dir()?.join("godot"))
    }

    fn runtime_layout(&self, release: &GodotRelease, arch: &str) -> Result<RuntimeLayout> {
        let flavor = match arch {
            "x86_64" => "x86_64",
            "x86" => "x86_32",
            "aarch64" => "arm64",
            "arm" => "arm32",
            other => return Err(unsupported_host_arch(self.platform(), other)),
        };
        let bin = format!("{}_linux.{}", release.file_stem(), flavor);
        Ok(RuntimeLayout {
            archive: format!("{bin}.zip"),
            entry: PathBuf::from(&bin),
            binary: PathBuf::from(bin),
        })
    }
}

impl PlatformProfile for MacosProfile {
    fn platform(&self) -> Platform {
        Platform::Macos
    }

    fn shared_library_suffix(&self) -> &'static str {
        ".dylib"
    }

    fn executable_suffix(&self) -> &'static str {
        ""
    }

    // ~/Library/Application Support/Godot
    fn godot_data_dir(&self) -> Result<PathBuf> {
        Ok(data_dir()?.join("Godot"))
    }

    // The macOS editor ships as one universal app bundle.
    fn runtime_layout(&self, release: &GodotRelease, _arch: &str) -> Result<RuntimeLayout> {
        Ok(RuntimeLayout {
            archive: format!("{}_macos.universal.zip", release.file_stem()),
            entry: PathBuf::from("Godot.app"),
            binary: PathBuf::from("Godot.app/Contents/MacOS/Godot"),
        })
    }
}

/// Profile for a platform.
pub fn profile_for(platform: Platform) -> Box<dyn PlatformProfile> {
    match platform {
        Platform::Windows => Box::new(WindowsProfile),
        Platform::Linux => Box::new(LinuxProfile),
        Platform::Macos => Box::new(MacosProfile),
    }
}

/// Profile of the machine running the pipeline.
pub fn host_profile() -> Result<Box<dyn PlatformProfile>> {
    Ok(profile_for(Platform::host()?))
}

fn data_dir() -> Result<PathBuf> {
    dirs::data_dir().ok_or_else(|| {
        ReleaseError::Configuration("cannot determine the user data directory".to_string()).into()
    })
}

fn unsupported_host_arch(platform: Platform, arch: &str) -> anyhow::Error {
    ReleaseError::Configuration(format!(
        "no Godot editor build is published for {platform} on '{arch}'"
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> GodotRelease {
        GodotRelease::new("4.3", "stable")
    }

    #[test]
    fn shared_library_suffixes() {
        assert_eq!(WindowsProfile.shared_library_suffix(), ".dll");
        assert_eq!(LinuxProfile.shared_library_suffix(), ".so");
        assert_eq!(MacosProfile.shared_library_suffix(), ".dylib");
        assert_eq!(WindowsProfile.executable_suffix(), ".exe");
    }

    #[test]
    fn linux_runtime_layout() {
        let layout = LinuxProfile.runtime_layout(&release(), "x86_64").unwrap();
        assert_eq!(layout.archive, "Godot_v4.3-stable_linux.x86_64.zip");
        assert_eq!(layout.entry, PathBuf::from("Godot_v4.3-stable_linux.x86_64"));
        assert_eq!(layout.binary, layout.entry);
    }

    #[test]
    fn windows_runtime_layout() {
        let layout = WindowsProfile.runtime_layout(&release(), "x86_64").unwrap();
        assert_eq!(layout.archive, "Godot_v4.3-stable_win64.exe.zip");
        assert_eq!(layout.binary, PathBuf::from("Godot_v4.3-stable_win64.exe"));
    }

    #[test]
    fn macos_runtime_is_an_app_bundle() {
        let layout = MacosProfile.runtime_layout(&release(), "aarch64").unwrap();
        assert_eq!(layout.archive, "Godot_v4.3-stable_macos.universal.zip");
        assert_eq!(layout.entry, PathBuf::from("Godot.app"));
        assert!(layout.binary.starts_with(&layout.entry));
        assert_eq!(layout.binary, PathBuf::from("Godot.app/Contents/MacOS/Godot"));
    }

    #[test]
    fn unsupported_arch_is_a_configuration_error() {
        let err = WindowsProfile.runtime_layout(&release(), "riscv64").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReleaseError>(),
            Some(ReleaseError::Configuration(_))
        ));
    }

    #[test]
    fn templates_dir_is_versioned() {
        if dirs::data_dir().is_none() {
            return;
        }
        let dir = LinuxProfile.export_templates_dir(&release()).unwrap();
        assert!(dir.ends_with("godot/export_templates/4.3.stable"));
    }
}
