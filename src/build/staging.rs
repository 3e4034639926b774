//! Deterministic names for per-architecture build outputs.
//!
//! The build tool's own output naming is not guaranteed to include the
//! architecture, so after each build the freshly written shared library is
//! found by scanning the library directory and copied to
//! `lib<module>.<platform>.template_<mode>.<arch><suffix>` in the staging
//! directory, where the universal assembler picks it up.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

use super::BuildTarget;
use crate::config::{BuildMode, Platform};

/// File name of a staged or assembled shared library.
pub fn library_file_name(
    module: &str,
    platform: Platform,
    mode: BuildMode,
    arch: &str,
    suffix: &str,
) -> String {
    format!(
        "lib{module}.{platform}.{}.{arch}{suffix}",
        mode.template_name()
    )
}

/// Modification time and size of a library file.
///
/// Coarse filesystem timestamps can leave a rewritten file with its old
/// mtime, so the size is compared too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub modified: SystemTime,
    pub len: u64,
}

/// Shared libraries present before a build.
pub type Snapshot = HashMap<PathBuf, Stamp>;

#[derive(Debug, Clone)]
pub struct LibraryStager {
    module: String,
    platform: Platform,
    suffix: String,
    search_dir: PathBuf,
    staging_dir: PathBuf,
}

impl LibraryStager {
    pub fn new(
        module: impl Into<String>,
        platform: Platform,
        suffix: impl Into<String>,
        search_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            module: module.into(),
            platform,
            suffix: suffix.into(),
            search_dir: search_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Staged path for `mode` and `arch`.
    pub fn staged_path(&self, mode: BuildMode, arch: &str) -> PathBuf {
        self.staging_dir.join(library_file_name(
            &self.module,
            self.platform,
            mode,
            arch,
            &self.suffix,
        ))
    }

    /// Record the shared libraries currently in the search directory.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let mut libraries = Snapshot::new();
        if !self.search_dir.is_dir() {
            return Ok(libraries);
        }
        for entry in WalkDir::new(&self.search_dir) {
            let entry = entry.with_context(|| {
                format!("scanning library directory '{}'", self.search_dir.display())
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.starts_with(&self.staging_dir)
                || !path.to_string_lossy().ends_with(&self.suffix)
            {
                continue;
            }
            let metadata = entry.metadata()?;
            let stamp = Stamp {
                modified: metadata.modified()?,
                len: metadata.len(),
            };
            libraries.insert(path.to_path_buf(), stamp);
        }
        Ok(libraries)
    }

    /// Copy the library `target` produced to its staged path.
    ///
    /// The produced library is the newest one that is new or changed since
    /// `before`. If the build tool rewrote nothing (an up-to-date build), the
    /// newest library whose name mentions the architecture is used.
    pub fn stage(&self, target: &BuildTarget, before: &Snapshot) -> Result<PathBuf> {
        let arch = target.arch.as_deref().unwrap_or("host");
        let after = self.snapshot()?;

        let changed = after
            .iter()
            .filter(|(path, stamp)| before.get(*path) != Some(*stamp));
        let source = match newest(changed) {
            Some(path) => path,
            None => match newest(after.iter().filter(|(path, _)| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().contains(arch))
            })) {
                Some(path) => path,
                None => bail!(
                    "no {} library for {target} found under '{}'",
                    self.suffix,
                    self.search_dir.display()
                ),
            },
        };

        let staged = self.staged_path(target.mode, arch);
        fs::create_dir_all(&self.staging_dir)?;
        fs::copy(&source, &staged).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                source.display(),
                staged.display()
            )
        })?;
        println!("  Staged {}", staged.display());
        debug!(source = %source.display(), staged = %staged.display(), "staged library");
        Ok(staged)
    }
}

fn newest<'a>(
    candidates: impl Iterator<Item = (&'a PathBuf, &'a Stamp)>,
) -> Option<PathBuf> {
    candidates
        .max_by(|(pa, ta), (pb, tb)| {
            ta.modified.cmp(&tb.modified).then_with(|| pb.cmp(pa))
        })
        .map(|(path, _)| path.clone())
}
