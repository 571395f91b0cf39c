//! Advisory run lock.
//!
//! Two updater processes must never work on the same installation at once.
//! The lock is a non-blocking exclusive `fs4` lock on
//! `<root>/.hytale-updater/update.lock`; a second run fails immediately with
//! [`UpdaterError::UpdateInProgress`] instead of waiting. The lock is released
//! when the [`RunLock`] is dropped or the process exits.

use crate::core::UpdaterError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock at `lock_path`, creating parent directories.
    pub async fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    anyhow::Error::from(UpdaterError::PermissionDenied {
                        operation: "create maintenance directory".to_string(),
                        path: parent.display().to_string(),
                    })
                } else {
                    anyhow::anyhow!("Failed to create directory {}: {}", parent.display(), e)
                }
            })?;
        }

        let path = lock_path.to_path_buf();
        let task_path = path.clone();

        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&task_path)
                .with_context(|| format!("Failed to open lock file: {}", task_path.display()))?;

            #[allow(unstable_name_collisions)]
            let acquired = match file.try_lock_exclusive() {
                Ok(acquired) => acquired,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to lock {}", task_path.display())
                    });
                }
            };

            if !acquired {
                return Err(UpdaterError::UpdateInProgress {
                    lock: task_path.display().to_string(),
                }
                .into());
            }

            Ok(file)
        })
        .await
        .context("Failed to spawn blocking task for lock acquisition")??;

        tracing::debug!("Acquired run lock {}", path.display());
        Ok(Self {
            file,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
