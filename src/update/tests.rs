//! End-to-end runs of the update pipeline against fake installations and a
//! scripted downloader.

#![cfg(unix)]

use super::*;
use crate::constants::{ASSETS_BUNDLE, MAINTENANCE_DIR};
use crate::core::UpdaterError;
use crate::test_utils::{FakeDownloader, PackageFixture, ServerFixture, FixedProcesses};
use crate::update::cleanup::CleanupOutcome;
use crate::update::lock::RunLock;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

struct Harness {
    _temp: TempDir,
    base: PathBuf,
    server: ServerFixture,
    tools: PathBuf,
    package: PathBuf,
}

impl Harness {
    fn new(package: PackageFixture) -> Self {
        crate::test_utils::init_test_logging(None);
        let temp = tempdir().unwrap();
        let base = temp.path().join("hytale");
        let server = ServerFixture::jar(base.join("Server")).unwrap();
        let tools = temp.path().join("tools");
        let package = package.write(&temp.path().join("fixtures/package.zip")).unwrap();
        Self {
            _temp: temp,
            base,
            server,
            tools,
            package,
        }
    }

    fn downloader(&self) -> FakeDownloader {
        FakeDownloader::new(&self.tools, &self.package)
    }

    fn config(&self) -> UpdateConfig {
        UpdateConfig {
            tool_dir: Some(self.tools.clone()),
            retry_delay_secs: 0,
            ..UpdateConfig::default()
        }
    }

    fn updater(&self, options: RunOptions) -> Updater {
        Updater::new(self.config(), options).with_process_table(FixedProcesses(false))
    }

    fn root(&self) -> &Path {
        &self.server.root
    }

    fn maintenance(&self) -> PathBuf {
        self.root().join(MAINTENANCE_DIR)
    }
}

fn assert_user_data_intact(server: &ServerFixture) {
    assert_eq!(server.read("config.json").unwrap(), r#"{"ServerName":"test"}"#);
    assert_eq!(server.read("universe/worlds/default/region.bin").unwrap(), "world data");
}

#[tokio::test]
#[serial]
async fn test_fresh_install_records_version_and_backs_up() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().version("1.2.3").install().unwrap();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(report.status, RunStatus::Updated);
    assert_eq!(report.version.as_deref(), Some("1.2.3"));
    assert_eq!(report.previous_version, None);
    assert_eq!(report.changed, vec!["HytaleServer.jar", "lib", "start.sh"]);
    assert_eq!(report.replaced, vec!["HytaleServer.jar", "lib"]);
    assert_eq!(report.download_attempts, 1);
    assert_eq!(report.sha256.as_ref().map(String::len), Some(64));

    assert_eq!(fs::read(h.maintenance().join("version.txt")).unwrap(), b"1.2.3");

    // New files are live
    assert_eq!(h.server.read("HytaleServer.jar").unwrap(), "new server");
    assert_eq!(h.server.read("lib/core.jar").unwrap(), "new core");
    assert_eq!(h.server.read("start.sh").unwrap(), "#!/bin/sh\n");

    // Preserved entries were not overwritten even though the package ships config.json
    assert_user_data_intact(&h.server);

    // Replaced entries are in the backup with their old content
    let backup = report.backup_dir.unwrap();
    assert_eq!(fs::read_to_string(backup.join("HytaleServer.jar")).unwrap(), "old server");
    assert_eq!(fs::read_to_string(backup.join("lib/core.jar")).unwrap(), "old core");
    assert!(!backup.join("config.json").exists());
    assert!(!backup.join("universe").exists());

    // Scratch space and staging are gone
    assert!(!h.maintenance().join("staging").exists());
    assert!(matches!(report.cleanup, CleanupOutcome::Removed(_)));
}

#[tokio::test]
#[serial]
async fn test_same_version_is_up_to_date_and_touches_nothing() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().version("1.2.3").install().unwrap();
    h.server.write(".hytale-updater/version.txt", "1.2.3").unwrap();

    let before: Vec<_> = h
        .server
        .snapshot_mtimes()
        .unwrap()
        .into_iter()
        .filter(|(path, _)| !path.starts_with(h.maintenance()))
        .collect();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(report.status, RunStatus::UpToDate);
    assert!(report.changed.is_empty());
    assert!(!h.maintenance().join("staging").exists());
    assert!(!h.maintenance().join("backups").exists());
    assert_eq!(h.server.read("HytaleServer.jar").unwrap(), "old server");

    let after: Vec<_> = h
        .server
        .snapshot_mtimes()
        .unwrap()
        .into_iter()
        .filter(|(path, _)| !path.starts_with(h.maintenance()))
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
#[serial]
async fn test_two_failed_attempts_then_success() {
    let h = Harness::new(PackageFixture::standard());
    let downloader = h.downloader().version("1.2.3").fail_first(2);
    downloader.install().unwrap();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(downloader.invocations(), 3);
    assert_eq!(report.download_attempts, 3);
    assert_eq!(report.status, RunStatus::Updated);
    assert_eq!(h.server.read("HytaleServer.jar").unwrap(), "new server");
    assert_eq!(fs::read_to_string(h.maintenance().join("version.txt")).unwrap(), "1.2.3");
}

#[tokio::test]
#[serial]
async fn test_corrupt_archive_counts_as_failed_attempt() {
    let h = Harness::new(PackageFixture::standard());
    let downloader = h.downloader().version("2.0.0").corrupt_first(1);
    downloader.install().unwrap();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(downloader.invocations(), 2);
    assert_eq!(report.download_attempts, 2);
}

#[tokio::test]
#[serial]
async fn test_downloader_without_output_counts_as_failed_attempt() {
    let h = Harness::new(PackageFixture::standard());
    let downloader = h.downloader().version("2.0.0").skip_output_first(1);
    downloader.install().unwrap();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(downloader.invocations(), 2);
    assert_eq!(report.download_attempts, 2);
    assert_eq!(report.status, RunStatus::Updated);
}

/// Downloader install dirs created by this process.
fn downloader_scratch_dirs() -> Vec<PathBuf> {
    let marker = format!("_{}_", std::process::id());
    fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let name = path.file_name().unwrap().to_string_lossy();
            name.starts_with("hytale-updater_downloader_") && name.contains(&marker)
        })
        .collect()
}

fn unreachable_downloader_config(h: &Harness) -> UpdateConfig {
    UpdateConfig {
        downloader_url: "http://127.0.0.1:9/hytale-downloader.zip".to_string(),
        ..h.config()
    }
}

#[tokio::test]
#[serial]
async fn test_failed_downloader_install_removed_with_force_cleanup() {
    let h = Harness::new(PackageFixture::standard());
    let before = downloader_scratch_dirs();

    let options = RunOptions {
        force_cleanup: true,
        ..RunOptions::default()
    };
    let err = Updater::new(unreachable_downloader_config(&h), options)
        .with_process_table(FixedProcesses(false))
        .run(None, &h.base)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdaterError>(),
        Some(UpdaterError::DownloaderInstallFailed { .. })
    ));
    assert_eq!(downloader_scratch_dirs(), before);
}

#[tokio::test]
#[serial]
async fn test_failed_downloader_install_kept_without_force_cleanup() {
    let h = Harness::new(PackageFixture::standard());
    let before = downloader_scratch_dirs();

    let result = Updater::new(unreachable_downloader_config(&h), RunOptions::default())
        .with_process_table(FixedProcesses(false))
        .run(None, &h.base)
        .await;
    assert!(result.is_err());

    let kept: Vec<PathBuf> =
        downloader_scratch_dirs().into_iter().filter(|p| !before.contains(p)).collect();
    assert_eq!(kept.len(), 1);
    for path in kept {
        fs::remove_dir_all(path).unwrap();
    }
}

#[tokio::test]
#[serial]
async fn test_download_failure_leaves_installation_untouched() {
    let h = Harness::new(PackageFixture::standard());
    let downloader = h.downloader().version("1.2.3").fail_first(10);
    downloader.install().unwrap();

    let err = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdaterError>(),
        Some(UpdaterError::DownloadFailed { attempts: 3, .. })
    ));
    assert_eq!(downloader.invocations(), 3);
    assert_eq!(h.server.read("HytaleServer.jar").unwrap(), "old server");
    assert!(!h.maintenance().join("version.txt").exists());
    assert!(!h.maintenance().join("staging").exists());
}

#[tokio::test]
#[serial]
async fn test_package_without_server_subtree_aborts_before_staging() {
    let h = Harness::new(PackageFixture::new().file("README.txt", "nothing useful"));
    h.downloader().version("1.2.3").install().unwrap();

    let err = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdaterError>(),
        Some(UpdaterError::ServerSubtreeMissing { .. })
    ));
    assert!(!h.maintenance().join("staging").exists());
    assert!(!h.maintenance().join("backups").exists());
    assert!(!h.maintenance().join("version.txt").exists());
    assert_eq!(h.server.read("HytaleServer.jar").unwrap(), "old server");
    assert_user_data_intact(&h.server);
}

#[tokio::test]
#[serial]
async fn test_running_server_blocks_before_any_change() {
    let h = Harness::new(PackageFixture::standard());
    let downloader = h.downloader().version("1.2.3");
    downloader.install().unwrap();
    let before = h.server.snapshot_mtimes().unwrap();

    let err = Updater::new(h.config(), RunOptions::default())
        .with_process_table(FixedProcesses(true))
        .run(None, &h.base)
        .await
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<UpdaterError>(), Some(UpdaterError::ServerRunning { .. })));
    assert_eq!(downloader.invocations(), 0);
    assert!(!h.maintenance().exists());
    assert_eq!(h.server.snapshot_mtimes().unwrap(), before);
}

#[tokio::test]
#[serial]
async fn test_dry_run_reports_without_changing_anything() {
    let h = Harness::new(PackageFixture::standard().assets("assets"));
    h.downloader().version("1.2.3").install().unwrap();
    let before = h.server.snapshot_mtimes().unwrap();

    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let report = h.updater(options).run(None, &h.base).await.unwrap();

    assert_eq!(report.status, RunStatus::DryRun);
    assert_eq!(report.changed, vec!["HytaleServer.jar", "lib", "start.sh"]);
    assert_eq!(report.replaced, vec!["HytaleServer.jar", "lib"]);
    assert!(report.backup_dir.is_none());
    assert!(!h.maintenance().exists());
    assert!(!h.root().join(ASSETS_BUNDLE).exists());
    assert_eq!(h.server.snapshot_mtimes().unwrap(), before);
    assert!(matches!(report.cleanup, CleanupOutcome::Removed(_)));
}

#[tokio::test]
#[serial]
async fn test_declined_confirmation_aborts() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().version("1.2.3").install().unwrap();

    let seen = Arc::new(std::sync::Mutex::new(None));
    let seen_in_hook = Arc::clone(&seen);
    let options = RunOptions {
        confirm: Some(Arc::new(move |plan: &UpdatePlan| -> anyhow::Result<bool> {
            *seen_in_hook.lock().unwrap() = Some(plan.clone());
            Ok(false)
        })),
        ..RunOptions::default()
    };

    let err = h.updater(options).run(None, &h.base).await.unwrap_err();

    assert!(matches!(err.downcast_ref::<UpdaterError>(), Some(UpdaterError::Aborted { .. })));
    let plan = seen.lock().unwrap().clone().unwrap();
    assert_eq!(plan.new_version.as_deref(), Some("1.2.3"));
    assert_eq!(plan.installed_version, None);
    assert_eq!(h.server.read("HytaleServer.jar").unwrap(), "old server");
}

#[tokio::test]
#[serial]
async fn test_assets_go_to_parent_when_parent_keeps_them() {
    let h = Harness::new(PackageFixture::standard().assets("new assets"));
    h.downloader().version("1.2.3").install().unwrap();
    fs::write(h.base.join(ASSETS_BUNDLE), "old assets").unwrap();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(fs::read_to_string(h.base.join(ASSETS_BUNDLE)).unwrap(), "new assets");
    assert!(!h.root().join(ASSETS_BUNDLE).exists());
    assert_eq!(
        report.assets_target.map(|p| fs::canonicalize(p).unwrap()),
        Some(fs::canonicalize(h.base.join(ASSETS_BUNDLE)).unwrap())
    );
}

#[tokio::test]
#[serial]
async fn test_assets_go_to_root_by_default() {
    let h = Harness::new(PackageFixture::standard().assets("new assets"));
    h.downloader().version("1.2.3").install().unwrap();

    h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(h.server.read(ASSETS_BUNDLE).unwrap(), "new assets");
    assert!(!h.base.join(ASSETS_BUNDLE).exists());
}

#[tokio::test]
#[serial]
async fn test_old_backups_are_pruned_after_success() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().version("1.2.3").install().unwrap();
    for name in ["backup-20200101-000000-000", "backup-20200102-000000-000", "backup-20200103-000000-000"] {
        fs::create_dir_all(h.maintenance().join("backups").join(name)).unwrap();
    }

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    let remaining: Vec<_> = fs::read_dir(h.maintenance().join("backups")).unwrap().collect();
    assert_eq!(remaining.len(), 3);
    assert!(report.backup_dir.unwrap().exists());
    assert_eq!(report.pruned.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_second_run_fails_while_lock_is_held() {
    let h = Harness::new(PackageFixture::standard());
    let downloader = h.downloader().version("1.2.3");
    downloader.install().unwrap();

    let _held = RunLock::acquire(&h.server.installation().lock_file()).await.unwrap();
    let err = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdaterError>(),
        Some(UpdaterError::UpdateInProgress { .. })
    ));
    assert_eq!(downloader.invocations(), 0);
}

#[tokio::test]
#[serial]
async fn test_rerun_after_update_is_idempotent() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().version("1.2.3").install().unwrap();

    let first = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();
    assert_eq!(first.status, RunStatus::Updated);

    let second = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();
    assert_eq!(second.status, RunStatus::UpToDate);
    assert_eq!(second.previous_version.as_deref(), Some("1.2.3"));

    let backups = fs::read_dir(h.maintenance().join("backups")).unwrap().count();
    assert_eq!(backups, 1);
}

#[tokio::test]
#[serial]
async fn test_missing_version_still_updates_without_record() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().install().unwrap();

    let report = h.updater(RunOptions::default()).run(None, &h.base).await.unwrap();

    assert_eq!(report.status, RunStatus::Updated);
    assert_eq!(report.version, None);
    assert!(!h.maintenance().join("version.txt").exists());
}

#[tokio::test]
#[serial]
async fn test_run_log_written_into_installation() {
    let h = Harness::new(PackageFixture::standard());
    h.downloader().version("1.2.3").install().unwrap();

    let log = crate::utils::DeferredLogFile::new();
    let report = h
        .updater(RunOptions::default())
        .with_log_file(log.clone())
        .run(None, &h.base)
        .await
        .unwrap();

    let log_path = report.log_file.unwrap();
    let logs_dir = fs::canonicalize(h.maintenance()).unwrap().join("logs");
    assert!(log_path.starts_with(&logs_dir));
    assert!(log_path.exists());
    assert_eq!(log.path(), Some(log_path));
}
