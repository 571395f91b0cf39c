//! In-place update of a server installation.
//!
//! This module applies a downloaded server package to a live installation
//! without losing user data.
//!
//! # Architecture Overview
//!
//! - **[`Updater`]**: Orchestrates one run from locating the server to cleanup
//! - **[`engine::UpdateEngine`]**: Extracts, stages and swaps the new files
//! - **[`backup::BackupSet`]**: Per-run rollback copy of every replaced entry
//! - **[`staging::StagingArea`]**: Assembly area inside the maintenance directory
//! - **[`version_check`]**: Compares the reported version with the recorded one
//! - **[`cleanup`]**: Removes or retains scratch space, prunes old backups and logs
//! - **[`lock::RunLock`]**: Keeps two runs off the same installation
//! - **[`config::UpdateConfig`]**: Tunables loaded from TOML
//!
//! ## Run Flow
//!
//! ```text
//! 1. Locate
//!    └── explicit destination, or marker search below the working directory
//!
//! 2. Guard
//!    ├── refuse while the server process is running
//!    └── take the advisory run lock, attach the run log
//!
//! 3. Fetch
//!    ├── install the downloader if missing
//!    ├── run it (up to N attempts, fixed delay)
//!    └── validate the archive, hash it
//!
//! 4. Version gate
//!    └── same version as recorded: done, nothing touched
//!
//! 5. Apply
//!    ├── extract, require the Server/ subtree
//!    ├── stage everything except preserved entries
//!    ├── move each replaced entry to the backup, move the staged one in
//!    ├── copy Assets.zip
//!    └── record the new version
//!
//! 6. Cleanup
//!    ├── success or --force-cleanup: delete scratch space and staging
//!    ├── failure: keep it and report where
//!    └── success: prune old backups and logs
//! ```
//!
//! # Preserved Entries
//!
//! `mods`, `universe`, `logs`, `config.json`, `bans.json`,
//! `permissions.json`, `whitelist.json`, `auth.enc` and
//! `.hytale-downloader-credentials.json` are never staged, replaced, backed up
//! or deleted, even when the package ships them. The same holds for the
//! `.hytale-updater` maintenance directory.
//!
//! # Failure Policy
//!
//! Any error aborts the run at the step it happened. There is no automatic
//! rollback: entries already swapped stay swapped, and the ones they replaced
//! are in the run's backup directory. The version record is only written after
//! every entry was swapped, so the next run retries the whole update.

pub mod backup;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod lock;
pub mod staging;
pub mod updater;
pub mod version_check;

#[cfg(test)]
mod tests;

pub use config::UpdateConfig;
pub use updater::{ConfirmFn, RunOptions, RunReport, RunStatus, UpdatePlan, Updater};
