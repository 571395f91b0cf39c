//! Server installation discovery.
//!
//! An installation is the directory holding `HytaleServer.jar` or
//! `HytaleServer.aot`. The updater works on exactly one installation per run,
//! either given explicitly on the command line or found by searching below the
//! working directory.
//!
//! # Search rules
//!
//! - An explicit destination must exist and be a directory. With
//!   [`DestinationValidation::Strict`] it must also contain a marker file.
//! - Without a destination the base directory itself is checked first, then
//!   the tree below it down to a bounded depth. The shallowest match wins.
//! - Two different directories matching at the same shallowest depth is an
//!   error rather than a guess.
//! - The updater's own maintenance directory is never searched.

pub mod running;

use crate::constants::{
    AOT_MARKER, BACKUPS_DIR, JAR_MARKER, LOCK_FILE, LOGS_DIR, MAINTENANCE_DIR, MARKER_FILES,
    STAGING_DIR, VERSION_FILE,
};
use crate::core::UpdaterError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use running::{ProcessTable, SystemProcesses, ensure_not_running};

/// Which server build is installed, resolved once from the marker files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    /// `HytaleServer.jar` is present.
    JarBased,
    /// Only `HytaleServer.aot` is present.
    AotBased,
}

impl ServerKind {
    /// Detect the kind from the markers in `dir`. The jar marker wins when both exist.
    pub fn detect(dir: &Path) -> Option<Self> {
        if dir.join(JAR_MARKER).is_file() {
            Some(Self::JarBased)
        } else if dir.join(AOT_MARKER).is_file() {
            Some(Self::AotBased)
        } else {
            None
        }
    }

    /// The marker file name for this kind.
    pub const fn marker(self) -> &'static str {
        match self {
            Self::JarBased => JAR_MARKER,
            Self::AotBased => AOT_MARKER,
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JarBased => write!(f, "jar"),
            Self::AotBased => write!(f, "aot"),
        }
    }
}

/// How strictly an explicitly given destination is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationValidation {
    /// The destination must contain a marker file.
    #[default]
    Strict,
    /// Any existing directory is accepted as the server root.
    Lenient,
}

/// The server installation a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstallation {
    /// Directory containing the marker file.
    pub root: PathBuf,
    pub kind: ServerKind,
}

impl ServerInstallation {
    pub fn new(root: impl Into<PathBuf>, kind: ServerKind) -> Self {
        Self {
            root: root.into(),
            kind,
        }
    }

    /// `<root>/.hytale-updater`
    pub fn maintenance_dir(&self) -> PathBuf {
        self.root.join(MAINTENANCE_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.maintenance_dir().join(STAGING_DIR)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.maintenance_dir().join(BACKUPS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.maintenance_dir().join(LOGS_DIR)
    }

    pub fn version_file(&self) -> PathBuf {
        self.maintenance_dir().join(VERSION_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.maintenance_dir().join(LOCK_FILE)
    }

    /// Path of the marker file that identified this installation.
    pub fn marker_path(&self) -> PathBuf {
        self.root.join(self.kind.marker())
    }
}

/// Resolve the installation for this run.
///
/// # Errors
///
/// - [`UpdaterError::DestinationInvalid`] when `explicit` is missing, not a
///   directory, or (strict mode) has no marker file
/// - [`UpdaterError::AmbiguousInstallation`] when two directories match at the
///   same shallowest depth
/// - [`UpdaterError::ServerNotFound`] when nothing matches
pub fn locate(
    explicit: Option<&Path>,
    base: &Path,
    validation: DestinationValidation,
    max_depth: usize,
) -> Result<ServerInstallation> {
    if let Some(path) = explicit {
        return validate_destination(path, validation);
    }

    if let Some(kind) = ServerKind::detect(base) {
        tracing::debug!(target: "server", "Found {} server in {}", kind, base.display());
        return Ok(ServerInstallation::new(canonical(base), kind));
    }

    tracing::debug!(
        target: "server",
        "No marker in {}, searching up to {} levels deep",
        base.display(),
        max_depth
    );

    let mut matches: Vec<(usize, PathBuf, ServerKind)> = Vec::new();

    let walker = WalkDir::new(base)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != MAINTENANCE_DIR);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(target: "server", "Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        if let Some(kind) = ServerKind::detect(entry.path()) {
            matches.push((entry.depth(), entry.into_path(), kind));
        }
    }

    let shallowest = matches.iter().map(|(depth, _, _)| *depth).min();
    let mut candidates = matches.into_iter().filter(|(depth, _, _)| Some(*depth) == shallowest);
    let best = candidates.next();

    if let (Some((_, first, _)), Some((_, second, _))) = (&best, candidates.next()) {
        return Err(UpdaterError::AmbiguousInstallation {
            first: first.display().to_string(),
            second: second.display().to_string(),
        }
        .into());
    }

    match best {
        Some((depth, root, kind)) => {
            tracing::info!(
                target: "server",
                "Found {} server at {} (depth {})",
                kind,
                root.display(),
                depth
            );
            Ok(ServerInstallation::new(canonical(&root), kind))
        }
        None => Err(UpdaterError::ServerNotFound {
            base: base.display().to_string(),
            depth: max_depth,
        }
        .into()),
    }
}

fn validate_destination(
    path: &Path,
    validation: DestinationValidation,
) -> Result<ServerInstallation> {
    if !path.exists() {
        return Err(UpdaterError::DestinationInvalid {
            path: path.display().to_string(),
            reason: "Path does not exist".to_string(),
        }
        .into());
    }
    if !path.is_dir() {
        return Err(UpdaterError::DestinationInvalid {
            path: path.display().to_string(),
            reason: "Path is not a directory".to_string(),
        }
        .into());
    }

    match (ServerKind::detect(path), validation) {
        (Some(kind), _) => Ok(ServerInstallation::new(canonical(path), kind)),
        (None, DestinationValidation::Lenient) => {
            tracing::warn!(
                target: "server",
                "No server marker in {}, accepting it as requested",
                path.display()
            );
            Ok(ServerInstallation::new(canonical(path), ServerKind::JarBased))
        }
        (None, DestinationValidation::Strict) => Err(UpdaterError::DestinationInvalid {
            path: path.display().to_string(),
            reason: format!("Neither {} was found in the directory", MARKER_FILES.join(" nor ")),
        }
        .into()),
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
