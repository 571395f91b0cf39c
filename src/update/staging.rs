use crate::constants::{MAINTENANCE_DIR, PRESERVED_ENTRIES};
use crate::utils::fs::{copy_entry, ensure_dir, remove_entry};
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether the host file system usually folds case, so `Config.json` and
/// `config.json` name the same file.
const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

/// Whether a top-level entry name is user data the update never touches.
///
/// Names match exactly on Linux and ignoring ASCII case on Windows and macOS.
/// The maintenance directory is treated the same way.
pub fn is_preserved(name: &OsStr) -> bool {
    std::iter::once(MAINTENANCE_DIR)
        .chain(PRESERVED_ENTRIES.iter().copied())
        .any(|p| names_match(name, p, CASE_INSENSITIVE_FS))
}

fn names_match(name: &OsStr, preserved: &str, ignore_case: bool) -> bool {
    if ignore_case {
        name.eq_ignore_ascii_case(preserved)
    } else {
        name == OsStr::new(preserved)
    }
}

/// Top-level entries of `dir` that an update may install, sorted by name.
pub fn installable_entries(dir: &Path) -> Result<Vec<OsString>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let name = entry?.file_name();
        if is_preserved(&name) {
            debug!("Skipping preserved entry {}", name.to_string_lossy());
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// The directory new files are assembled in before they are swapped into the
/// live root. Rebuilt from scratch on every run.
#[derive(Debug, Clone)]
pub struct StagingArea {
    path: PathBuf,
}

impl StagingArea {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove leftovers from an earlier run and recreate the directory.
    pub fn prepare(&self) -> Result<()> {
        remove_entry(&self.path)
            .with_context(|| format!("Failed to clear staging area {}", self.path.display()))?;
        ensure_dir(&self.path)
    }

    /// Copy every installable entry of `server_dir` into the staging area.
    /// Returns the staged names in sorted order.
    pub fn stage_from(&self, server_dir: &Path) -> Result<Vec<OsString>> {
        let names = installable_entries(server_dir)?;
        for name in &names {
            copy_entry(&server_dir.join(name), &self.path.join(name)).with_context(|| {
                format!("Failed to stage '{}'", name.to_string_lossy())
            })?;
        }
        debug!("Staged {} entries in {}", names.len(), self.path.display());
        Ok(names)
    }

    /// Entries currently in the staging area, sorted by name.
    pub fn entries(&self) -> Result<Vec<OsString>> {
        let mut names = fs::read_dir(&self.path)
            .with_context(|| format!("Failed to read staging area {}", self.path.display()))?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}
