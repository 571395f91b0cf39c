use crate::constants::{BACKUP_PREFIX, LOG_PREFIX, TIMESTAMP_FORMAT};
use crate::core::UpdaterError;
use crate::download::{ArchiveFetcher, EventSink, FetchedArchive};
use crate::server::{
    ProcessTable, ServerInstallation, SystemProcesses, ensure_not_running, locate,
};
use crate::update::cleanup::{CleanupController, CleanupOutcome, RunArtifacts, prune_oldest};
use crate::update::config::UpdateConfig;
use crate::update::engine::{EngineOutcome, UpdateEngine};
use crate::update::lock::RunLock;
use crate::update::version_check::{GateDecision, VersionRecord, evaluate};
use crate::utils::fs::create_scratch_dir;
use crate::utils::log_file::DeferredLogFile;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Asked once before the first change to the installation. Returning
/// `Ok(false)` aborts the run.
pub type ConfirmFn = Arc<dyn Fn(&UpdatePlan) -> Result<bool> + Send + Sync>;

/// Per-run switches.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Fetch and decide, but change nothing in the installation.
    pub dry_run: bool,
    /// Delete scratch space even when the run fails.
    pub force_cleanup: bool,
    /// Confirmation hook; `None` proceeds without asking.
    pub confirm: Option<ConfirmFn>,
    /// Receives downloader events (progress, version, output lines).
    pub progress: Option<EventSink>,
}

/// What is about to happen, shown to the confirmation hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub root: PathBuf,
    pub installed_version: Option<String>,
    pub new_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// New files were installed.
    Updated,
    /// The reported version matches the recorded one.
    UpToDate,
    /// Dry run; `changed` lists what would have been installed.
    DryRun,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub installation: ServerInstallation,
    pub status: RunStatus,
    /// Version reported by the downloader.
    pub version: Option<String>,
    /// Version recorded before this run.
    pub previous_version: Option<String>,
    /// Top-level entries installed (or that would be), in swap order.
    pub changed: Vec<String>,
    /// Entries among `changed` that replaced an existing entry.
    pub replaced: Vec<String>,
    pub backup_dir: Option<PathBuf>,
    pub assets_target: Option<PathBuf>,
    pub download_attempts: u32,
    pub sha256: Option<String>,
    pub log_file: Option<PathBuf>,
    pub pruned: Vec<PathBuf>,
    pub cleanup: CleanupOutcome,
}

/// State threaded through the steps of one run.
struct RunContext {
    installation: ServerInstallation,
    artifacts: RunArtifacts,
    fetched: Option<FetchedArchive>,
    previous_version: Option<String>,
    log_file: Option<PathBuf>,
}

/// How the pipeline ended, before cleanup.
enum Finish {
    UpToDate,
    Applied(EngineOutcome),
}

/// Runs one update from locating the server to cleanup.
///
/// # Examples
///
/// ```rust,no_run
/// use hytale_updater::update::{RunOptions, UpdateConfig, Updater};
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let updater = Updater::new(UpdateConfig::default(), RunOptions::default());
/// let report = updater.run(None, Path::new(".")).await?;
/// println!("{} entries changed", report.changed.len());
/// # Ok(())
/// # }
/// ```
pub struct Updater {
    config: UpdateConfig,
    options: RunOptions,
    processes: Box<dyn ProcessTable + Send + Sync>,
    log_file: Option<DeferredLogFile>,
}

impl Updater {
    pub fn new(config: UpdateConfig, options: RunOptions) -> Self {
        Self {
            config,
            options,
            processes: Box::new(SystemProcesses),
            log_file: None,
        }
    }

    /// Replace the process table used by the running-instance guard.
    pub fn with_process_table(
        mut self,
        processes: impl ProcessTable + Send + Sync + 'static,
    ) -> Self {
        self.processes = Box::new(processes);
        self
    }

    /// Write this run's log into the installation once it is located.
    pub fn with_log_file(mut self, log_file: DeferredLogFile) -> Self {
        self.log_file = Some(log_file);
        self
    }

    /// Update the installation at `explicit`, or the one found below `base`.
    pub async fn run(&self, explicit: Option<&Path>, base: &Path) -> Result<RunReport> {
        let installation = locate(
            explicit,
            base,
            self.config.destination_validation,
            self.config.search_depth,
        )?;
        info!("Server installation: {} ({})", installation.root.display(), installation.kind);

        ensure_not_running(self.processes.as_ref(), &installation)?;

        let dry_run = self.options.dry_run;
        let _lock = if dry_run {
            None
        } else {
            Some(RunLock::acquire(&installation.lock_file()).await?)
        };

        let mut ctx = RunContext {
            installation,
            artifacts: RunArtifacts::default(),
            fetched: None,
            previous_version: None,
            log_file: None,
        };

        if !dry_run {
            self.attach_log(&mut ctx);
        }

        let result = self.pipeline(&mut ctx).await;

        let cleanup = CleanupController::new(self.options.force_cleanup)
            .finish(&ctx.artifacts, result.is_ok());

        let finish = match result {
            Ok(finish) => finish,
            Err(e) => {
                if let CleanupOutcome::Retained(paths) = &cleanup {
                    if !paths.is_empty() {
                        warn!("Run failed; kept {} scratch path(s) for inspection", paths.len());
                    }
                }
                return Err(e);
            }
        };

        let mut pruned = Vec::new();
        if let Finish::Applied(outcome) = &finish {
            if !dry_run {
                pruned = self.prune(&ctx, outcome.backup_dir.as_deref());
            }
        }

        Ok(self.report(ctx, finish, cleanup, pruned))
    }

    async fn pipeline(&self, ctx: &mut RunContext) -> Result<Finish> {
        let mut fetcher = ArchiveFetcher::new(self.config.fetch_config());
        if let Some(sink) = &self.options.progress {
            fetcher = fetcher.with_event_sink(Arc::clone(sink));
        }

        let install = fetcher.prepare_downloader()?;
        ctx.artifacts.downloader_install = install.install_dir.clone();
        fetcher.install_downloader(&install).await?;

        let temp_root = create_scratch_dir("run")?;
        ctx.artifacts.temp_root = Some(temp_root.clone());

        let fetched = fetcher.fetch(&install.binary, &temp_root).await?;
        info!(
            "Package ready after {} attempt(s), sha256 {}",
            fetched.attempts, fetched.sha256
        );

        let record = VersionRecord::new(ctx.installation.version_file());
        ctx.previous_version = record.read()?;
        let version = fetched.version.clone();
        let archive = fetched.path.clone();
        ctx.fetched = Some(fetched);

        if let GateDecision::UpToDate(_) =
            evaluate(version.as_deref(), ctx.previous_version.as_deref())
        {
            return Ok(Finish::UpToDate);
        }

        if !self.options.dry_run {
            if let Some(confirm) = &self.options.confirm {
                let plan = UpdatePlan {
                    root: ctx.installation.root.clone(),
                    installed_version: ctx.previous_version.clone(),
                    new_version: version.clone(),
                };
                if !confirm(&plan)? {
                    return Err(UpdaterError::Aborted {
                        reason: "Update declined".to_string(),
                    }
                    .into());
                }
            }
            ctx.artifacts.staging = Some(ctx.installation.staging_dir());
        }

        let installation = ctx.installation.clone();
        let dry_run = self.options.dry_run;
        let outcome = tokio::task::spawn_blocking(move || {
            UpdateEngine::new(&installation).dry_run(dry_run).apply(
                &archive,
                &temp_root,
                version.as_deref(),
            )
        })
        .await
        .context("Update task panicked")??;

        Ok(Finish::Applied(outcome))
    }

    fn attach_log(&self, ctx: &mut RunContext) {
        let Some(log_file) = &self.log_file else {
            return;
        };

        let name =
            format!("{}{}.log", LOG_PREFIX, chrono::Local::now().format(TIMESTAMP_FORMAT));
        let path = ctx.installation.logs_dir().join(name);
        match log_file.attach(&path) {
            Ok(()) => {
                info!("Logging to {}", path.display());
                ctx.log_file = Some(path);
            }
            Err(e) => warn!("Could not open run log {}: {:#}", path.display(), e),
        }
    }

    fn prune(&self, ctx: &RunContext, current_backup: Option<&Path>) -> Vec<PathBuf> {
        let mut pruned = Vec::new();

        match prune_oldest(
            &ctx.installation.backups_dir(),
            BACKUP_PREFIX,
            None,
            self.config.keep_backups,
            current_backup,
        ) {
            Ok(paths) => pruned.extend(paths),
            Err(e) => warn!("Failed to prune old backups: {:#}", e),
        }

        match prune_oldest(
            &ctx.installation.logs_dir(),
            LOG_PREFIX,
            Some(".log"),
            self.config.keep_logs,
            ctx.log_file.as_deref(),
        ) {
            Ok(paths) => pruned.extend(paths),
            Err(e) => warn!("Failed to prune old logs: {:#}", e),
        }

        pruned
    }

    fn report(
        &self,
        ctx: RunContext,
        finish: Finish,
        cleanup: CleanupOutcome,
        pruned: Vec<PathBuf>,
    ) -> RunReport {
        let (download_attempts, sha256, version) = match &ctx.fetched {
            Some(f) => (f.attempts, Some(f.sha256.clone()), f.version.clone()),
            None => (0, None, None),
        };

        let mut report = RunReport {
            installation: ctx.installation,
            status: RunStatus::UpToDate,
            version,
            previous_version: ctx.previous_version,
            changed: Vec::new(),
            replaced: Vec::new(),
            backup_dir: None,
            assets_target: None,
            download_attempts,
            sha256,
            log_file: ctx.log_file,
            pruned,
            cleanup,
        };

        if let Finish::Applied(outcome) = finish {
            report.status =
                if self.options.dry_run { RunStatus::DryRun } else { RunStatus::Updated };
            report.changed = outcome.changed;
            report.replaced = outcome.replaced;
            report.backup_dir = outcome.backup_dir;
            report.assets_target = outcome.assets_target;
        }

        report
    }
}
