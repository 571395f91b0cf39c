//! Package archive checks and extraction.
//!
//! All functions here are blocking; async callers run them through
//! [`tokio::task::spawn_blocking`].

use crate::core::UpdaterError;
use crate::utils::fs::ensure_dir;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Check that `path` is a readable zip archive.
///
/// Every entry is read to the end so truncated data and CRC mismatches are
/// caught here rather than halfway through extraction.
///
/// # Errors
///
/// [`UpdaterError::CorruptArchive`] when the file cannot be opened as a zip or
/// any entry fails to read.
pub fn validate_archive(path: &Path) -> Result<()> {
    let corrupt = |reason: String| UpdaterError::CorruptArchive {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| corrupt(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| corrupt(format!("{}: {}", entry.name(), e)))?;
    }

    debug!("Archive {} is valid ({} entries)", path.display(), archive.len());
    Ok(())
}

/// Extract `archive_path` into `dest`, creating it if needed.
///
/// Entries whose names would escape `dest` are rejected by the zip reader.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    ensure_dir(dest)?;

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| UpdaterError::CorruptArchive {
        path: archive_path.display().to_string(),
        reason: e.to_string(),
    })?;

    archive.extract(dest).with_context(|| {
        format!("Failed to extract {} into {}", archive_path.display(), dest.display())
    })?;

    debug!("Extracted {} entries into {}", archive.len(), dest.display());
    Ok(())
}

/// Hex-encoded SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    Ok(format!("{:x}", hasher.finalize()))
}
