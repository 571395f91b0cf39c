//! Test utilities for the updater
//!
//! This module provides fixtures for writing tests against real directory
//! trees: fake server installations, update packages built as zip files, a
//! scriptable stand-in for the downloader, and a process table with a fixed
//! answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use hytale_updater::test_utils::{PackageFixture, ServerFixture};
//!
//! let temp = tempfile::tempdir().unwrap();
//! let server = ServerFixture::jar(temp.path().join("Server")).unwrap();
//! let package = PackageFixture::new()
//!     .server_file("HytaleServer.jar", "new jar")
//!     .write(&temp.path().join("package.zip"))
//!     .unwrap();
//! ```

pub mod downloader;
pub mod fixtures;

pub use downloader::FakeDownloader;
pub use fixtures::{PackageFixture, ServerFixture, FixedProcesses};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG` when set, otherwise stays silent.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
