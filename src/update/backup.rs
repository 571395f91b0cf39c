use crate::constants::{BACKUP_PREFIX, TIMESTAMP_FORMAT};
use crate::utils::fs::{ensure_dir, move_entry};
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The per-run rollback copy of every live entry an update replaced.
///
/// Each run gets its own directory under `backups/`, named
/// `backup-<YYYYmmdd-HHMMSS-mmm>`. If that name is taken a `-N` suffix is
/// added, so two runs never share (or merge into) one backup.
///
/// Entries are moved in, not copied: the old file leaves the live root and
/// lands here with its content and permissions intact. Restoring is a manual
/// operation.
///
/// # Examples
///
/// ```rust,no_run
/// use hytale_updater::update::backup::BackupSet;
/// use std::ffi::OsStr;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// let root = Path::new("/srv/hytale/Server");
/// let backup = BackupSet::create(&root.join(".hytale-updater/backups"))?;
/// backup.move_in(root, OsStr::new("HytaleServer.jar"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupSet {
    path: PathBuf,
}

impl BackupSet {
    /// Create a new, uniquely named backup directory inside `backups_dir`.
    pub fn create(backups_dir: &Path) -> Result<Self> {
        ensure_dir(backups_dir)?;

        let base = format!("{}{}", BACKUP_PREFIX, chrono::Local::now().format(TIMESTAMP_FORMAT));
        let mut suffix = 0u32;

        loop {
            let name = if suffix == 0 { base.clone() } else { format!("{base}-{suffix}") };
            let path = backups_dir.join(name);

            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!("Created backup directory {}", path.display());
                    return Ok(Self {
                        path,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to create backup directory {}", path.display())
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move `root/name` into the backup. Returns `false` when there was
    /// nothing to move.
    pub fn move_in(&self, root: &Path, name: &OsStr) -> Result<bool> {
        let live = root.join(name);
        if fs::symlink_metadata(&live).is_err() {
            return Ok(false);
        }

        move_entry(&live, &self.path.join(name))
            .with_context(|| format!("Failed to back up '{}'", name.to_string_lossy()))?;
        debug!("Backed up {}", name.to_string_lossy());
        Ok(true)
    }

    /// Whether the backup holds nothing (a run that only added entries).
    pub fn is_empty(&self) -> bool {
        fs::read_dir(&self.path).map(|mut entries| entries.next().is_none()).unwrap_or(true)
    }
}
