//! Shared utilities
//!
//! - [`fs`] - Entry-level copy/move/remove helpers, atomic writes, scratch dirs
//! - [`log_file`] - Per-run log file writer for `tracing-subscriber`
//! - [`progress`] - Progress bars for the download phase

pub mod fs;
pub mod log_file;
pub mod progress;

pub use fs::{atomic_write, copy_dir, ensure_dir};
pub use log_file::DeferredLogFile;
pub use progress::ProgressBar;
