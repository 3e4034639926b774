//! Downloading and unpacking toolchain archives.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::error::ReleaseError;

/// Retrieves a remote file.
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest`. Failures are [`ReleaseError::Network`].
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTPS fetcher with standard certificate validation.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!(url = %url, "downloading");
        let network = |message: String| ReleaseError::Network {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(network(format!("HTTP {}", response.status())).into());
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file =
            File::create(dest).with_context(|| format!("creating '{}'", dest.display()))?;
        let size = response
            .copy_to(&mut file)
            .map_err(|e| network(e.to_string()))?;

        info!(path = %dest.display(), size, "download complete");
        Ok(())
    }
}

/// Unpack a zip-family archive (`.zip`, `.tpz`) into `dest`.
///
/// Entries keep their archive paths. Unix permission bits are applied when
/// the archive records them.
pub fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let extraction = |message: String| ReleaseError::Extraction {
        archive: archive_path.to_path_buf(),
        message,
    };

    let file = File::open(archive_path).map_err(|e| extraction(e.to_string()))?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| extraction(e.to_string()))?;

    fs::create_dir_all(dest)
        .with_context(|| format!("creating extraction directory '{}'", dest.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extraction(format!("reading entry {i}: {e}")))?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| extraction(format!("unsafe entry name '{}'", entry.name())))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("creating '{}'", out_path.display()))?;
        io::copy(&mut entry, &mut out).map_err(|e| extraction(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }

    debug!(archive = %archive_path.display(), dest = %dest.display(), "unpacked");
    Ok(())
}
