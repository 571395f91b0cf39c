//! Scratch directories in the system temp location.
//!
//! Unlike RAII temp dirs these are never removed on drop: a failed run keeps
//! its scratch space for inspection and the cleanup controller decides when to
//! delete it.

use crate::utils::fs::dirs::ensure_dir;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Create a fresh, uniquely named directory under the system temp dir.
///
/// The name looks like `hytale-updater_{prefix}_{timestamp}_{pid}_{n}`.
pub fn create_scratch_dir(prefix: &str) -> Result<PathBuf> {
    let parent = std::env::temp_dir();
    ensure_dir(&parent)?;

    let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let pid = std::process::id();

    loop {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = parent.join(format!("hytale-updater_{prefix}_{timestamp}_{pid}_{n}"));

        match fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to create scratch directory: {}", path.display())
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dirs_are_unique_and_kept() {
        let first = create_scratch_dir("test").unwrap();
        let second = create_scratch_dir("test").unwrap();

        assert_ne!(first, second);
        assert!(first.is_dir());
        assert!(first.to_string_lossy().contains("hytale-updater_test_"));

        fs::remove_dir_all(&first).unwrap();
        fs::remove_dir_all(&second).unwrap();
    }
}
