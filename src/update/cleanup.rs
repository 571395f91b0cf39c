use crate::utils::fs::remove_entry;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Scratch artifacts produced by a run.
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    /// Scratch dir used to install the downloader, when it was installed this run.
    pub downloader_install: Option<PathBuf>,
    /// Scratch dir holding the package and its extraction.
    pub temp_root: Option<PathBuf>,
    /// The installation's staging directory.
    pub staging: Option<PathBuf>,
}

impl RunArtifacts {
    fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.downloader_install, &self.temp_root, &self.staging].into_iter().flatten()
    }
}

/// What cleanup did with the scratch artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// These paths were deleted.
    Removed(Vec<PathBuf>),
    /// The run failed; these paths were kept for inspection.
    Retained(Vec<PathBuf>),
}

/// Decides what happens to scratch artifacts when a run ends.
///
/// A successful run (or any run with `force`) deletes its scratch space.
/// A failed run keeps everything so the partial state can be inspected.
/// Backups are never touched here except by [`prune_oldest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupController {
    force: bool,
}

impl CleanupController {
    pub fn new(force: bool) -> Self {
        Self {
            force,
        }
    }

    pub fn finish(&self, artifacts: &RunArtifacts, succeeded: bool) -> CleanupOutcome {
        let existing: Vec<PathBuf> = artifacts.paths().filter(|p| p.exists()).cloned().collect();

        if !succeeded && !self.force {
            for path in &existing {
                warn!("Keeping {} for inspection", path.display());
            }
            return CleanupOutcome::Retained(existing);
        }

        let mut removed = Vec::new();
        for path in existing {
            match remove_entry(&path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    removed.push(path);
                }
                Err(e) => warn!("Failed to remove {}: {:#}", path.display(), e),
            }
        }
        CleanupOutcome::Removed(removed)
    }
}

/// Delete the oldest entries of `dir` whose names start with `prefix` (and
/// end with `suffix`, if given), keeping the `keep` most recently modified.
///
/// `protect` is never deleted and takes one of the `keep` slots.
pub fn prune_oldest(
    dir: &Path,
    prefix: &str,
    suffix: Option<&str>,
    keep: usize,
    protect: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(prefix) || suffix.is_some_and(|s| !name.ends_with(s)) {
            continue;
        }

        let path = entry.path();
        if protect.is_some_and(|p| p == path) {
            continue;
        }

        let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, path));
    }

    // Newest first; names carry a timestamp so they break ties.
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let keep = if protect.is_some() { keep.saturating_sub(1) } else { keep };
    let mut removed = Vec::new();
    for (_, path) in candidates.into_iter().skip(keep) {
        remove_entry(&path)?;
        info!("Pruned {}", path.display());
        removed.push(path);
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, secs_ago: u64) {
        let time = SystemTime::now() - Duration::from_secs(secs_ago);
        fs::File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    #[test]
    fn test_finish_removes_on_success() {
        let temp = tempdir().unwrap();
        let artifacts = RunArtifacts {
            downloader_install: None,
            temp_root: Some(temp.path().join("tmp")),
            staging: Some(temp.path().join("staging")),
        };
        fs::create_dir_all(temp.path().join("tmp/extracted")).unwrap();
        fs::create_dir_all(temp.path().join("staging")).unwrap();

        let outcome = CleanupController::new(false).finish(&artifacts, true);
        assert!(matches!(outcome, CleanupOutcome::Removed(ref paths) if paths.len() == 2));
        assert!(!temp.path().join("tmp").exists());
        assert!(!temp.path().join("staging").exists());
    }

    #[test]
    fn test_finish_retains_on_failure_unless_forced() {
        let temp = tempdir().unwrap();
        let artifacts = RunArtifacts {
            temp_root: Some(temp.path().join("tmp")),
            ..RunArtifacts::default()
        };
        fs::create_dir_all(temp.path().join("tmp")).unwrap();

        let outcome = CleanupController::new(false).finish(&artifacts, false);
        assert_eq!(outcome, CleanupOutcome::Retained(vec![temp.path().join("tmp")]));
        assert!(temp.path().join("tmp").exists());

        let outcome = CleanupController::new(true).finish(&artifacts, false);
        assert_eq!(outcome, CleanupOutcome::Removed(vec![temp.path().join("tmp")]));
        assert!(!temp.path().join("tmp").exists());
    }

    #[test]
    fn test_prune_keeps_newest() {
        let temp = tempdir().unwrap();
        for (i, age) in [(1, 500), (2, 400), (3, 300), (4, 200), (5, 100)] {
            let path = temp.path().join(format!("update-{i}.log"));
            fs::write(&path, "log").unwrap();
            set_mtime(&path, age);
        }
        fs::write(temp.path().join("notes.txt"), "keep me").unwrap();

        let removed = prune_oldest(temp.path(), "update-", Some(".log"), 3, None).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!temp.path().join("update-1.log").exists());
        assert!(!temp.path().join("update-2.log").exists());
        assert!(temp.path().join("update-5.log").exists());
        assert!(temp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_prune_never_removes_protected_entry() {
        let temp = tempdir().unwrap();
        let current = temp.path().join("backup-current");
        fs::create_dir_all(&current).unwrap();
        fs::create_dir_all(temp.path().join("backup-old")).unwrap();

        // Make the current backup look older than the other one.
        let old_time = SystemTime::now() - Duration::from_secs(1000);
        fs::File::open(&current).unwrap().set_modified(old_time).ok();

        prune_oldest(temp.path(), "backup-", None, 1, Some(&current)).unwrap();

        assert!(current.exists());
        assert!(!temp.path().join("backup-old").exists());
    }
}
