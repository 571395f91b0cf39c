//! Command-line interface for hytale-updater.
//!
//! The tool has a single action: update the server installation in the
//! current directory tree (or at an explicit destination) to the latest build
//! the downloader provides. Everything else is a flag.
//!
//! # Usage
//!
//! ```bash
//! # Find the server below the working directory and update it
//! hytale-updater
//!
//! # Update a specific directory without asking
//! hytale-updater /srv/hytale/Server --yes
//!
//! # See what would change
//! hytale-updater --dry-run
//!
//! # Clean up scratch files even if the run fails
//! hytale-updater --force-cleanup
//! ```
//!
//! # Global Options
//!
//! - `--verbose` / `--quiet` - Console log level (`RUST_LOG` applies otherwise)
//! - `--no-progress` - Disable the download progress bar
//! - `--config` - Path to a `hytale-updater.toml`
//!
//! Errors are returned to `main`, which renders them with
//! [`user_friendly_error`](crate::core::user_friendly_error).

mod logging;
mod prompt;
mod summary;


pub use logging::init_logging;

use crate::constants::NO_PROGRESS_ENV_VAR;
use crate::download::{DownloaderEvent, EventSink};
use crate::server::DestinationValidation;
use crate::update::{ConfirmFn, RunOptions, UpdateConfig, Updater};
use crate::utils::{DeferredLogFile, ProgressBar};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Runtime configuration for CLI execution.
///
/// Holds what would otherwise be read straight from flags or the
/// environment, so tests can drive [`Cli::execute_with_config`] directly.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Console log filter. `None` falls back to `RUST_LOG`, then `info`.
    pub log_level: Option<String>,

    /// When `true`, sets `HYTALE_UPDATER_NO_PROGRESS` so progress bars stay
    /// hidden.
    pub no_progress: bool,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply this configuration to the process environment.
    ///
    /// Call once, before any progress bar is created.
    pub fn apply_to_env(&self) {
        if self.no_progress {
            // SAFETY: called from the main task before any other thread reads
            // the environment.
            unsafe {
                std::env::set_var(NO_PROGRESS_ENV_VAR, "1");
            }
        }
    }
}

/// Update a Hytale dedicated server in place.
#[derive(Parser, Debug)]
#[command(
    name = "hytale-updater",
    about = "Update a Hytale dedicated server installation in place",
    version,
    long_about = "Locates a Hytale server directory, downloads the latest server package with the \
                  official downloader, and installs it while keeping worlds, configuration and \
                  other user data untouched. Replaced files are backed up under \
                  .hytale-updater/backups."
)]
pub struct Cli {
    /// Server directory to update. Searched for below the working directory
    /// when omitted.
    destination: Option<PathBuf>,

    /// Delete scratch files even when the run fails.
    #[arg(long)]
    force_cleanup: bool,

    /// Download and compare versions, but change nothing.
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation before changing the installation.
    #[arg(short, long)]
    yes: bool,

    /// Accept an explicit destination without a server marker file.
    #[arg(long)]
    lenient_destination: bool,

    /// Path to a configuration file.
    ///
    /// Overrides `HYTALE_UPDATER_CONFIG` and `hytale-updater.toml` next to the
    /// executable.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug output.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// Disable the download progress bar.
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    /// Execute with a configuration built from the parsed flags.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate flags into a [`CliConfig`].
    ///
    /// ```rust,ignore
    /// let cli = Cli::parse_from(["hytale-updater", "--verbose"]);
    /// assert_eq!(cli.build_config().log_level.as_deref(), Some("debug"));
    /// ```
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("warn".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
        }
    }

    /// Execute with an injected configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply_to_env();

        let log_file = DeferredLogFile::new();
        init_logging(config.log_level.as_deref(), log_file.clone());

        let (mut update_config, source) = UpdateConfig::load(self.config.as_deref()).await?;
        if let Some(path) = &source {
            debug!("Loaded configuration from {}", path.display());
        }
        if self.lenient_destination {
            update_config.destination_validation = DestinationValidation::Lenient;
        }

        let bar = ProgressBar::new_percent();
        let options = RunOptions {
            dry_run: self.dry_run,
            force_cleanup: self.force_cleanup,
            confirm: self.confirm_hook(),
            progress: Some(progress_sink(bar.clone())),
        };

        let base = std::env::current_dir().context("Failed to read the working directory")?;
        let result = Updater::new(update_config, options)
            .with_log_file(log_file)
            .run(self.destination.as_deref(), &base)
            .await;
        bar.finish_and_clear();

        let report = result?;
        summary::print(&report);
        Ok(())
    }

    fn confirm_hook(&self) -> Option<ConfirmFn> {
        if self.yes || self.dry_run {
            return None;
        }
        Some(Arc::new(prompt::confirm_update))
    }
}

/// Drive `bar` from downloader events.
fn progress_sink(bar: ProgressBar) -> EventSink {
    Arc::new(move |event: &DownloaderEvent| match event {
        DownloaderEvent::Progress(percent) => bar.set_percent(*percent),
        DownloaderEvent::VersionDetected(version) => {
            bar.set_message(format!("Downloading {version}"));
        }
        DownloaderEvent::Line(_) => {}
    })
}
