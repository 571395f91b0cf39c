//! Library-level update runs covering installation layouts the unit tests do
//! not.

#![cfg(unix)]

mod common;

use common::TestWorkspace;
use hytale_updater::constants::PRESERVED_ENTRIES;
use hytale_updater::core::UpdaterError;
use hytale_updater::server::{DestinationValidation, ServerKind};
use hytale_updater::test_utils::{PackageFixture, ServerFixture, FixedProcesses};
use hytale_updater::update::{RunOptions, RunStatus, UpdateConfig, Updater};
use serial_test::serial;
use std::fs;

fn config(ws: &TestWorkspace) -> UpdateConfig {
    UpdateConfig {
        tool_dir: Some(ws.tools.clone()),
        retry_delay_secs: 0,
        ..UpdateConfig::default()
    }
}

fn updater(config: UpdateConfig) -> Updater {
    Updater::new(config, RunOptions::default()).with_process_table(FixedProcesses(false))
}

#[tokio::test]
#[serial]
async fn test_every_preserved_entry_survives() {
    // A hostile package that ships every preserved name
    let mut package = PackageFixture::standard();
    for name in PRESERVED_ENTRIES {
        package = package.server_file(&format!("{name}/from-package"), "package");
    }
    let ws = TestWorkspace::new(package);
    for name in PRESERVED_ENTRIES {
        if !ws.server.root.join(name).exists() {
            ws.server.write(name, "user data").unwrap();
        }
    }
    ws.downloader().version("1.0.0").install().unwrap();

    let report = updater(config(&ws)).run(None, ws.path()).await.unwrap();

    assert_eq!(report.status, RunStatus::Updated);
    for name in PRESERVED_ENTRIES {
        assert!(!report.changed.iter().any(|c| c == name), "{name} was installed");
        assert!(!ws.server.root.join(name).join("from-package").exists());
    }
    assert_eq!(ws.server.read("mods").unwrap(), "user data");
    assert_eq!(ws.server.read("universe/worlds/default/region.bin").unwrap(), "world data");
}

#[tokio::test]
#[serial]
async fn test_aot_server_is_updated_in_place() {
    let package = PackageFixture::new()
        .server_file("HytaleServer.aot", "new aot")
        .server_file("lib/core.jar", "new core");
    let ws = TestWorkspace::new(package);
    let aot = ServerFixture::aot(ws.path().join("aot-server")).unwrap();
    fs::remove_dir_all(&ws.server.root).unwrap();
    ws.downloader().version("3.1.0").install().unwrap();

    let report = updater(config(&ws)).run(Some(&aot.root), ws.path()).await.unwrap();

    assert_eq!(report.installation.kind, ServerKind::AotBased);
    assert_eq!(aot.read("HytaleServer.aot").unwrap(), "new aot");
    let backup = report.backup_dir.unwrap();
    assert_eq!(fs::read_to_string(backup.join("HytaleServer.aot")).unwrap(), "old server");
}

#[tokio::test]
#[serial]
async fn test_lenient_destination_accepts_empty_directory() {
    let ws = TestWorkspace::new(PackageFixture::standard());
    ws.downloader().version("1.0.0").install().unwrap();
    let fresh = ws.path().join("fresh");
    fs::create_dir(&fresh).unwrap();

    let strict = updater(config(&ws)).run(Some(&fresh), ws.path()).await.unwrap_err();
    assert!(matches!(
        strict.downcast_ref::<UpdaterError>(),
        Some(UpdaterError::DestinationInvalid { .. })
    ));

    let lenient = UpdateConfig {
        destination_validation: DestinationValidation::Lenient,
        ..config(&ws)
    };
    let report = updater(lenient).run(Some(&fresh), ws.path()).await.unwrap();

    assert_eq!(report.status, RunStatus::Updated);
    assert_eq!(fs::read_to_string(fresh.join("HytaleServer.jar")).unwrap(), "new server");
    assert!(report.replaced.is_empty());
}

#[tokio::test]
#[serial]
async fn test_version_change_replaces_again() {
    let ws = TestWorkspace::new(PackageFixture::standard());
    ws.server.write(".hytale-updater/version.txt", "0.9.0").unwrap();
    ws.downloader().version("1.0.0").install().unwrap();

    let report = updater(config(&ws)).run(None, ws.path()).await.unwrap();

    assert_eq!(report.previous_version.as_deref(), Some("0.9.0"));
    assert_eq!(report.version.as_deref(), Some("1.0.0"));
    assert_eq!(ws.server.read(".hytale-updater/version.txt").unwrap(), "1.0.0");
}

#[tokio::test]
#[serial]
async fn test_ambiguous_search_is_rejected() {
    let ws = TestWorkspace::new(PackageFixture::standard());
    ServerFixture::jar(ws.path().join("other/Server")).unwrap();
    ws.downloader().version("1.0.0").install().unwrap();

    let err = updater(config(&ws)).run(None, ws.path()).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdaterError>(),
        Some(UpdaterError::AmbiguousInstallation { .. })
    ));
    assert_eq!(ws.downloader().invocations(), 0);
}
