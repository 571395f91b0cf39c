//! Shared setup for integration tests.

#![allow(dead_code)]

use hytale_updater::test_utils::{FakeDownloader, PackageFixture, ServerFixture};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A working directory holding a jar server under `hytale/Server`, a
/// downloader directory and a prepared package.
pub struct TestWorkspace {
    pub temp: TempDir,
    pub server: ServerFixture,
    pub tools: PathBuf,
    pub package: PathBuf,
}

impl TestWorkspace {
    pub fn new(package: PackageFixture) -> Self {
        hytale_updater::test_utils::init_test_logging(None);
        let temp = tempfile::tempdir().unwrap();
        let server = ServerFixture::jar(temp.path().join("hytale/Server")).unwrap();
        let tools = temp.path().join("tools");
        let package = package.write(&temp.path().join("fixtures/package.zip")).unwrap();
        Self {
            temp,
            server,
            tools,
            package,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn downloader(&self) -> FakeDownloader {
        FakeDownloader::new(&self.tools, &self.package)
    }

    /// Write a config file pointing at the fake downloader with no retry
    /// delay and return its path.
    pub fn write_config(&self) -> PathBuf {
        let path = self.path().join("hytale-updater.toml");
        let content = format!(
            "tool_dir = \"{}\"\nretry_delay_secs = 0\n",
            self.tools.display()
        );
        fs::write(&path, content).unwrap();
        path
    }

    pub fn maintenance(&self) -> PathBuf {
        self.server.root.join(".hytale-updater")
    }
}
