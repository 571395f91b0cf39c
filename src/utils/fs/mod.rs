//! File system utilities for the update engine
//!
//! Entry-level helpers (copy, move, remove a file or a whole tree by its
//! top-level name) plus atomic writes for small state files.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hytale_updater::utils::fs::{atomic_write, copy_entry, move_entry};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! copy_entry(Path::new("extracted/Server/lib"), Path::new("staging/lib"))?;
//! move_entry(Path::new("staging/lib"), Path::new("Server/lib"))?;
//! atomic_write(Path::new("Server/.hytale-updater/version.txt"), b"1.2.3")?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod dirs;
pub mod temp;

pub use atomic::atomic_write;
pub use dirs::{copy_dir, copy_entry, ensure_dir, move_entry, remove_entry};
pub use temp::create_scratch_dir;
