//! Versioned toolchain bundles the pipeline needs but does not build.
//!
//! Two artifacts come from the Godot release server: the editor binary used
//! for headless exports, and the export-template bundle it embeds into each
//! platform archive. Both are pinned to one Godot version and channel.
//!
//! ```text
//! GodotRelease ──► ToolchainArtifact (name, version, install path, URL)
//!                        │
//!                        ▼
//!                ArtifactResolver::resolve ──► installed path
//!                   │ 1. install path present?
//!                   │ 2. same executable on PATH?
//!                   │ 3. downloads allowed? fetch, extract, move
//! ```

pub mod fetch;
pub mod resolver;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::platform::PlatformProfile;

pub use fetch::{Fetcher, HttpFetcher};
pub use resolver::ArtifactResolver;

const RELEASE_URL_ROOT: &str = "https://github.com/godotengine/godot/releases/download";

/// A pinned Godot release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GodotRelease {
    pub version: String,
    pub channel: String,
}

impl GodotRelease {
    pub fn new(version: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            channel: channel.into(),
        }
    }

    /// Prefix shared by every file of the release, e.g. `Godot_v4.3-stable`.
    pub fn file_stem(&self) -> String {
        format!("Godot_v{}-{}", self.version, self.channel)
    }

    /// Directory name Godot uses for installed templates, e.g. `4.3.stable`.
    pub fn templates_dir_name(&self) -> String {
        format!("{}.{}", self.version, self.channel)
    }

    /// Download URL of `filename` within this release.
    pub fn url_for(&self, filename: &str) -> String {
        format!(
            "{RELEASE_URL_ROOT}/{}-{}/{filename}",
            self.version, self.channel
        )
    }

    /// The export-template bundle, installed into Godot's user data directory.
    pub fn export_templates(&self, profile: &dyn PlatformProfile) -> Result<ToolchainArtifact> {
        let install_path = profile.export_templates_dir(self)?;
        let archive = format!("{}_export_templates.tpz", self.file_stem());
        Ok(ToolchainArtifact {
            name: "godot-export-templates".to_string(),
            version: self.templates_dir_name(),
            remote_url: self.url_for(&archive),
            archive_entry: PathBuf::from("templates"),
            install_root: install_path.clone(),
            install_path,
            executable: false,
            lookup_name: None,
        })
    }

    /// The editor binary for the host, installed under `build_dir`.
    pub fn runtime(
        &self,
        profile: &dyn PlatformProfile,
        host_arch: &str,
        build_dir: &Path,
    ) -> Result<ToolchainArtifact> {
        let layout = profile.runtime_layout(self, host_arch)?;
        Ok(ToolchainArtifact {
            name: "godot".to_string(),
            version: self.templates_dir_name(),
            remote_url: self.url_for(&layout.archive),
            install_root: build_dir.join(&layout.entry),
            install_path: build_dir.join(&layout.binary),
            archive_entry: layout.entry,
            executable: true,
            lookup_name: Some("godot".to_string()),
        })
    }
}

/// A named, versioned external dependency with a well-known install location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainArtifact {
    pub name: String,
    pub version: String,
    /// Path callers use once the artifact is installed.
    pub install_path: PathBuf,
    pub remote_url: String,
    /// Top-level path inside the extracted archive that gets installed.
    pub archive_entry: PathBuf,
    /// Where `archive_entry` is moved to. Contains `install_path`.
    pub install_root: PathBuf,
    /// Mark `install_path` executable before use.
    pub executable: bool,
    /// Executable name to look for on the search path, if any.
    pub lookup_name: Option<String>,
}

impl ToolchainArtifact {
    /// Identity used for locking concurrent installs.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}
