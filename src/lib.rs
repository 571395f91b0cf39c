//! hytale-updater - in-place updater for Hytale dedicated servers
//!
//! Updates a server directory to the latest build delivered by the official
//! downloader while leaving worlds, configuration, mods and other user data
//! alone. Every file that gets replaced is moved into a timestamped backup
//! first, and the installed version is recorded so repeated runs are no-ops.
//!
//! # Run Flow
//!
//! 1. [`server::locate`] finds the installation (explicit destination, the
//!    working directory, or a bounded search below it)
//! 2. [`server::ensure_not_running`] refuses to touch a live server
//! 3. An advisory lock under `.hytale-updater/` keeps runs exclusive
//! 4. [`download::ArchiveFetcher`] installs the downloader if needed, runs it
//!    with retries and validates the zip it produces
//! 5. The version gate compares the reported version with the recorded one
//! 6. The update engine extracts, stages, backs up, swaps, copies
//!    `Assets.zip` and records the version
//! 7. Scratch space is cleaned and old backups and logs are pruned
//!
//! See [`update`] for the details of each step.
//!
//! # Layout Inside the Installation
//!
//! ```text
//! <server root>/
//! ├── HytaleServer.jar | HytaleServer.aot
//! ├── universe/, mods/, config.json, ...   (never touched)
//! └── .hytale-updater/
//!     ├── version.txt
//!     ├── update.lock
//!     ├── staging/
//!     ├── backups/backup-<timestamp>/
//!     └── logs/update-<timestamp>.log
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Argument parsing, logging setup and the final summary
//! - [`core`] - Error types and user-facing error rendering
//! - [`server`] - Installation discovery and the running-instance guard
//! - [`download`] - Downloader installation, invocation and archive checks
//! - [`update`] - Configuration, version gate, update engine and cleanup
//! - [`utils`] - Filesystem helpers, progress bars and the run log sink

pub mod cli;
pub mod constants;
pub mod core;
pub mod download;
pub mod server;
pub mod update;
pub mod utils;

// test_utils is available for unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
