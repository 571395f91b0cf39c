use crate::constants::JAR_MARKER;
use crate::server::{ProcessTable, ServerInstallation, ServerKind};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use zip::write::SimpleFileOptions;

/// A server directory on disk with a marker, some server files and user data.
pub struct ServerFixture {
    pub root: PathBuf,
    pub kind: ServerKind,
}

impl ServerFixture {
    /// A jar-based server with `HytaleServer.jar`, `lib/core.jar`, a world in
    /// `universe/` and a `config.json`.
    pub fn jar(root: impl Into<PathBuf>) -> Result<Self> {
        Self::create(root.into(), ServerKind::JarBased)
    }

    /// Same layout with `HytaleServer.aot` as the marker.
    pub fn aot(root: impl Into<PathBuf>) -> Result<Self> {
        Self::create(root.into(), ServerKind::AotBased)
    }

    fn create(root: PathBuf, kind: ServerKind) -> Result<Self> {
        let fixture = Self {
            root,
            kind,
        };
        fixture.write(kind.marker(), "old server")?;
        fixture.write("lib/core.jar", "old core")?;
        fixture.write("universe/worlds/default/region.bin", "world data")?;
        fixture.write("config.json", r#"{"ServerName":"test"}"#)?;
        Ok(fixture)
    }

    /// Write a file relative to the root, creating parents.
    pub fn write(&self, relative: &str, content: &str) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.root.join(relative);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn installation(&self) -> ServerInstallation {
        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        ServerInstallation::new(root, self.kind)
    }

    /// Modification time of every file and directory below the root, sorted
    /// by path.
    pub fn snapshot_mtimes(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            let modified = entry.metadata()?.modified()?;
            entries.push((entry.path().to_path_buf(), modified));
        }
        Ok(entries)
    }
}

/// Builder for update package archives.
#[derive(Default)]
pub struct PackageFixture {
    entries: Vec<(String, Vec<u8>)>,
}

impl PackageFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A package with a new jar, a new `lib/core.jar`, a new `start.sh`, and a
    /// `config.json` that must never be installed.
    pub fn standard() -> Self {
        Self::new()
            .server_file(JAR_MARKER, "new server")
            .server_file("lib/core.jar", "new core")
            .server_file("start.sh", "#!/bin/sh\n")
            .server_file("config.json", "{\"overwritten\":true}")
    }

    /// Add a file under `Server/`.
    pub fn server_file(self, relative: &str, content: &str) -> Self {
        self.file(&format!("Server/{relative}"), content)
    }

    /// Add a file at an arbitrary path inside the archive.
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.entries.push((path.to_string(), content.as_bytes().to_vec()));
        self
    }

    /// Add a top-level `Assets.zip`.
    pub fn assets(self, content: &str) -> Self {
        self.file("Assets.zip", content)
    }

    pub fn write(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = zip::ZipWriter::new(file);
        for (name, content) in &self.entries {
            writer.start_file(name.as_str(), SimpleFileOptions::default())?;
            writer.write_all(content)?;
        }
        writer.finish()?;
        Ok(path.to_path_buf())
    }
}

/// A process table with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedProcesses(pub bool);

impl ProcessTable for FixedProcesses {
    fn is_server_running(&self, _installation: &ServerInstallation) -> bool {
        self.0
    }
}
