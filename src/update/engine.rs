use crate::constants::{ASSETS_BUNDLE, SERVER_SUBTREE};
use crate::core::UpdaterError;
use crate::download::extract_archive;
use crate::server::ServerInstallation;
use crate::update::backup::BackupSet;
use crate::update::staging::{StagingArea, installable_entries};
use crate::update::version_check::VersionRecord;
use crate::utils::fs::move_entry;
use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Steps of an update, in order. A failure aborts at the current step; there
/// is no automatic rollback from the backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStage {
    Extract,
    ValidatePackage,
    Stage,
    BackupAndSwap,
    CopyAssets,
    PersistVersion,
    Done,
}

impl fmt::Display for EngineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extracting the package",
            Self::ValidatePackage => "validating the package layout",
            Self::Stage => "staging new files",
            Self::BackupAndSwap => "swapping files into place",
            Self::CopyAssets => "copying the assets bundle",
            Self::PersistVersion => "recording the installed version",
            Self::Done => "finishing",
        };
        f.write_str(name)
    }
}

/// What the engine did (or, in dry-run mode, would do).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutcome {
    /// Top-level entries installed into the root, in swap order.
    pub changed: Vec<String>,
    /// Entries among `changed` that replaced an existing one.
    pub replaced: Vec<String>,
    /// The backup directory of this run.
    pub backup_dir: Option<PathBuf>,
    /// Where `Assets.zip` was copied.
    pub assets_target: Option<PathBuf>,
    /// Version written to the record.
    pub recorded_version: Option<String>,
}

/// Applies an update package to an installation.
///
/// The engine owns the staging area and the backup set for the duration of
/// the run. Everything happens synchronously; async callers should run it on
/// a blocking thread.
pub struct UpdateEngine<'a> {
    installation: &'a ServerInstallation,
    dry_run: bool,
    stage: EngineStage,
}

impl<'a> UpdateEngine<'a> {
    pub fn new(installation: &'a ServerInstallation) -> Self {
        Self {
            installation,
            dry_run: false,
            stage: EngineStage::Extract,
        }
    }

    /// Only report what would change; the installation is left alone.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Extract `archive` under `temp_root` and install it.
    pub fn apply(
        &mut self,
        archive: &Path,
        temp_root: &Path,
        version: Option<&str>,
    ) -> Result<EngineOutcome> {
        let installation = self.installation;
        let root = installation.root.as_path();
        let mut outcome = EngineOutcome::default();

        self.enter(EngineStage::Extract);
        let extracted = temp_root.join("extracted");
        extract_archive(archive, &extracted).with_context(|| self.failure())?;

        self.enter(EngineStage::ValidatePackage);
        let server_dir = extracted.join(SERVER_SUBTREE);
        if !server_dir.is_dir() {
            return Err(UpdaterError::ServerSubtreeMissing {
                subtree: SERVER_SUBTREE.to_string(),
            }
            .into());
        }

        if self.dry_run {
            self.preview(&server_dir, &extracted, version, &mut outcome)?;
            self.enter(EngineStage::Done);
            return Ok(outcome);
        }

        self.enter(EngineStage::Stage);
        let staging = StagingArea::new(installation.staging_dir());
        staging.prepare().with_context(|| self.failure())?;
        let staged = staging.stage_from(&server_dir).with_context(|| self.failure())?;
        info!("Staged {} entries", staged.len());

        self.enter(EngineStage::BackupAndSwap);
        let backup =
            BackupSet::create(&installation.backups_dir()).with_context(|| self.failure())?;
        outcome.backup_dir = Some(backup.path().to_path_buf());

        for name in &staged {
            let entry_name = name.to_string_lossy().into_owned();
            if backup.move_in(root, name).with_context(|| self.failure())? {
                outcome.replaced.push(entry_name.clone());
            }
            move_entry(&staging.path().join(name), &root.join(name))
                .with_context(|| format!("Failed to install '{entry_name}'"))
                .with_context(|| self.failure())?;
            debug!("Installed {}", entry_name);
            outcome.changed.push(entry_name);
        }
        info!(
            "Installed {} entries ({} replaced, backup at {})",
            outcome.changed.len(),
            outcome.replaced.len(),
            backup.path().display()
        );

        self.enter(EngineStage::CopyAssets);
        let bundle = extracted.join(ASSETS_BUNDLE);
        if bundle.is_file() {
            let target = assets_target(root);
            fs::copy(&bundle, &target)
                .with_context(|| format!("Failed to copy {ASSETS_BUNDLE} to {}", target.display()))
                .with_context(|| self.failure())?;
            info!("Copied {} to {}", ASSETS_BUNDLE, target.display());
            outcome.assets_target = Some(target);
        }

        self.enter(EngineStage::PersistVersion);
        if let Some(version) = version {
            VersionRecord::new(installation.version_file())
                .write(version)
                .with_context(|| self.failure())?;
            outcome.recorded_version = Some(version.to_string());
        }

        self.enter(EngineStage::Done);
        Ok(outcome)
    }

    fn preview(
        &self,
        server_dir: &Path,
        extracted: &Path,
        version: Option<&str>,
        outcome: &mut EngineOutcome,
    ) -> Result<()> {
        let root = &self.installation.root;
        let names = installable_entries(server_dir)?;

        info!(
            "[dry-run] Would stage {} entries in {}",
            names.len(),
            self.installation.staging_dir().display()
        );
        for name in &names {
            let entry_name = name.to_string_lossy().into_owned();
            if fs::symlink_metadata(root.join(name)).is_ok() {
                info!("[dry-run] Would replace {} (old copy moved to backup)", entry_name);
                outcome.replaced.push(entry_name.clone());
            } else {
                info!("[dry-run] Would add {}", entry_name);
            }
            outcome.changed.push(entry_name);
        }

        if extracted.join(ASSETS_BUNDLE).is_file() {
            let target = assets_target(root);
            info!("[dry-run] Would copy {} to {}", ASSETS_BUNDLE, target.display());
            outcome.assets_target = Some(target);
        }

        if let Some(version) = version {
            info!("[dry-run] Would record version {}", version);
            outcome.recorded_version = Some(version.to_string());
        }

        Ok(())
    }

    fn enter(&mut self, stage: EngineStage) {
        debug!("Update stage: {}", stage);
        self.stage = stage;
    }

    fn failure(&self) -> String {
        format!("Update failed while {}", self.stage)
    }
}

/// Where the assets bundle goes: the root, unless the root has none and its
/// parent already keeps one.
fn assets_target(root: &Path) -> PathBuf {
    let in_root = root.join(ASSETS_BUNDLE);
    if in_root.exists() {
        return in_root;
    }
    match root.parent().map(|parent| parent.join(ASSETS_BUNDLE)) {
        Some(in_parent) if in_parent.exists() => in_parent,
        _ => in_root,
    }
}
