//! Locate-or-fetch resolution of toolchain artifacts.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use tracing::{debug, info};

use super::fetch::{unpack_zip, Fetcher};
use super::ToolchainArtifact;
use crate::artifact::filesystem::{move_path, remove_path, set_executable};
use crate::error::ReleaseError;
use crate::process::Runner;

/// Finds installed toolchain artifacts and installs missing ones.
pub struct ArtifactResolver<'a> {
    runner: &'a dyn Runner,
    fetcher: &'a dyn Fetcher,
    build_dir: PathBuf,
}

/// Held while an artifact is being installed. Dropping it releases the lock.
struct InstallLock {
    _file: File,
    path: PathBuf,
}

impl<'a> ArtifactResolver<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        fetcher: &'a dyn Fetcher,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fetcher,
            build_dir: build_dir.into(),
        }
    }

    /// Path of `artifact`, installing it first when it is missing.
    ///
    /// Order: the well-known install path, then an executable of the same
    /// name on the search path, then a download (only if `allow_download`).
    pub fn resolve(&self, artifact: &ToolchainArtifact, allow_download: bool) -> Result<PathBuf> {
        if let Some(path) = self.installed(artifact)? {
            return Ok(path);
        }

        if let Some(lookup) = &artifact.lookup_name {
            if let Some(found) = self.runner.locate(lookup) {
                info!(artifact = %artifact.name, path = %found.display(), "using copy from PATH");
                return Ok(found);
            }
        }

        if !allow_download {
            return Err(ReleaseError::missing_tool(
                artifact.name.clone(),
                format!(
                    "{} {} is not installed at '{}' and downloads are disabled",
                    artifact.name,
                    artifact.version,
                    artifact.install_path.display()
                ),
            )
            .into());
        }

        let lock = self.acquire_lock(artifact)?;
        debug!(lock = %lock.path.display(), "install lock held");
        // Another process may have finished the install while we waited.
        if let Some(path) = self.installed(artifact)? {
            return Ok(path);
        }
        self.install(artifact)?;
        drop(lock);

        self.installed(artifact)?.ok_or_else(|| {
            ReleaseError::Extraction {
                archive: PathBuf::from(&artifact.remote_url),
                message: format!(
                    "installed bundle has no '{}'",
                    artifact.install_path.display()
                ),
            }
            .into()
        })
    }

    /// The install path if it exists, made executable when required.
    fn installed(&self, artifact: &ToolchainArtifact) -> Result<Option<PathBuf>> {
        let path = &artifact.install_path;
        if !path.exists() {
            return Ok(None);
        }
        // Zip extraction does not always carry the mode bits.
        if artifact.executable && path.is_file() {
            set_executable(path)?;
        }
        debug!(artifact = %artifact.name, path = %path.display(), "already installed");
        Ok(Some(path.clone()))
    }

    fn install(&self, artifact: &ToolchainArtifact) -> Result<()> {
        println!("Fetching {} {}...", artifact.name, artifact.version);

        fs::create_dir_all(&self.build_dir).with_context(|| {
            format!("creating build directory '{}'", self.build_dir.display())
        })?;
        let scratch = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(&self.build_dir)
            .context("creating scratch directory")?;

        let archive = scratch.path().join(archive_file_name(&artifact.remote_url));
        self.fetcher.fetch(&artifact.remote_url, &archive)?;

        let unpacked = scratch.path().join("unpacked");
        unpack_zip(&archive, &unpacked)?;

        let entry = unpacked.join(&artifact.archive_entry);
        if !entry.exists() {
            return Err(ReleaseError::Extraction {
                archive: archive.clone(),
                message: format!("archive has no '{}'", artifact.archive_entry.display()),
            }
            .into());
        }

        // A leftover root without the install path is an interrupted install.
        remove_path(&artifact.install_root)?;
        move_path(&entry, &artifact.install_root).with_context(|| {
            format!(
                "installing {} into '{}'",
                artifact.name,
                artifact.install_root.display()
            )
        })?;

        info!(
            artifact = %artifact.name,
            path = %artifact.install_path.display(),
            "installed"
        );
        Ok(())
    }

    fn acquire_lock(&self, artifact: &ToolchainArtifact) -> Result<InstallLock> {
        let lock_path = self
            .build_dir
            .join(".locks")
            .join(format!("{}.lock", artifact.identity()));
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Lock files are never unlinked: removing a held lock would let a
        // second process lock a fresh file at the same path.
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
        lock_file
            .lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

        Ok(InstallLock {
            _file: lock_file,
            path: lock_path,
        })
    }
}

fn archive_file_name(url: &str) -> &str {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip")
}
