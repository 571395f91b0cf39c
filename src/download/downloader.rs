//! Installation of the external downloader tool.
//!
//! The downloader lives next to the updater (or in the configured tool
//! directory). When it is missing, its distribution zip is fetched once,
//! unpacked into a scratch directory, and the platform binary is copied into
//! place with executable permissions.

use crate::constants::DOWNLOADER_BINARY;
use crate::core::UpdaterError;
use crate::download::archive::extract_archive;
use crate::utils::fs::{create_scratch_dir, ensure_dir};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Where the downloader binary is, and the scratch directory used to install
/// it when it was missing.
///
/// Installing is split in two so the caller can record the scratch directory
/// for cleanup before anything that can fail touches the network.
#[derive(Debug, Clone)]
pub struct DownloaderInstall {
    pub binary: PathBuf,
    pub install_dir: Option<PathBuf>,
}

impl DownloaderInstall {
    /// Look for the binary in `tool_dir`. When it is missing, create the
    /// scratch directory [`DownloaderInstall::install`] will work in.
    pub fn prepare(tool_dir: &Path) -> Result<Self> {
        let binary = tool_dir.join(DOWNLOADER_BINARY);
        if binary.is_file() {
            debug!("Using existing downloader at {}", binary.display());
            return Ok(Self {
                binary,
                install_dir: None,
            });
        }

        Ok(Self {
            binary,
            install_dir: Some(create_scratch_dir("downloader")?),
        })
    }

    /// Whether [`DownloaderInstall::install`] has work to do.
    pub fn is_missing(&self) -> bool {
        self.install_dir.is_some()
    }

    /// Fetch the distribution from `url` and install the binary. Does nothing
    /// when the binary was already present.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::DownloaderInstallFailed`] when the distribution cannot
    ///   be fetched or unpacked
    /// - [`UpdaterError::DownloaderMissing`] when the distribution has no
    ///   binary for this platform
    pub async fn install(&self, url: &str) -> Result<()> {
        let Some(install_dir) = &self.install_dir else {
            return Ok(());
        };

        info!("Downloader not found at {}, fetching {}", self.binary.display(), url);

        let archive_path = install_dir.join("hytale-downloader.zip");
        fetch_to_file(url, &archive_path).await.map_err(|e| {
            UpdaterError::DownloaderInstallFailed {
                url: url.to_string(),
                reason: format!("{e:#}"),
            }
        })?;

        let extract_dir = install_dir.join("extracted");
        let target = self.binary.clone();
        tokio::task::spawn_blocking(move || {
            install_from_archive(&archive_path, &extract_dir, &target)
        })
        .await
        .context("Downloader install task panicked")?
        .map_err(|e| match e.downcast::<UpdaterError>() {
            Ok(typed @ UpdaterError::DownloaderMissing { .. }) => anyhow::Error::from(typed),
            Ok(other) => UpdaterError::DownloaderInstallFailed {
                url: url.to_string(),
                reason: other.to_string(),
            }
            .into(),
            Err(e) => UpdaterError::DownloaderInstallFailed {
                url: url.to_string(),
                reason: format!("{e:#}"),
            }
            .into(),
        })?;

        info!("Installed downloader at {}", self.binary.display());
        Ok(())
    }
}

async fn fetch_to_file(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("Server rejected request for {url}"))?;

    let bytes = response.bytes().await.context("Failed to read downloader archive")?;
    debug!("Fetched {} bytes from {}", bytes.len(), url);

    tokio::fs::write(dest, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))
}

/// Unpack a downloader distribution and copy its platform binary to `target`.
pub fn install_from_archive(archive: &Path, extract_dir: &Path, target: &Path) -> Result<()> {
    extract_archive(archive, extract_dir)?;

    let found = WalkDir::new(extract_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == DOWNLOADER_BINARY)
        .map(walkdir::DirEntry::into_path)
        .ok_or_else(|| UpdaterError::DownloaderMissing {
            binary: DOWNLOADER_BINARY.to_string(),
        })?;

    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }
    std::fs::copy(&found, target).with_context(|| {
        format!("Failed to install downloader from {} to {}", found.display(), target.display())
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to mark {} executable", target.display()))?;
    }

    Ok(())
}
