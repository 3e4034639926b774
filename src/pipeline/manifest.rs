//! Record of the archives a release run produced.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::artifact::filesystem::{sha256_file, write_json_atomic};
use crate::config::{BuildMode, Platform};

pub const MANIFEST_FILENAME: &str = "release-manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub platform: String,
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub created_at: String,
    pub mode: String,
    pub godot_version: String,
    pub archives: Vec<ArchiveRecord>,
}

impl ReleaseManifest {
    /// Describe `archives`, hashing each one.
    pub fn collect(
        mode: BuildMode,
        godot_version: &str,
        archives: &[(Platform, PathBuf)],
    ) -> Result<Self> {
        let records = archives
            .iter()
            .map(|(platform, path)| {
                let (sha256, size) = sha256_file(path)?;
                Ok(ArchiveRecord {
                    platform: platform.to_string(),
                    path: path.clone(),
                    size,
                    sha256,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            created_at: now_utc_compact(),
            mode: mode.to_string(),
            godot_version: godot_version.to_string(),
            archives: records,
        })
    }

    /// Write to `<build_dir>/release-manifest.json`, replacing any old one.
    pub fn write(&self, build_dir: &Path) -> Result<PathBuf> {
        let path = build_dir.join(MANIFEST_FILENAME);
        write_json_atomic(&path, self)?;
        Ok(path)
    }
}

fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
