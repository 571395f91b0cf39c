//! Running-instance guard.
//!
//! The updater refuses to touch an installation while its server process is
//! alive. A process counts as the server when one of its command line
//! arguments names a marker file that resolves into the installation root.
//! Relative arguments are resolved against the process working directory, so
//! `java -jar Server/HytaleServer.jar` started from the parent directory is
//! caught as well as a bare `HytaleServer.jar` started from the root.

use super::ServerInstallation;
use crate::constants::MARKER_FILES;
use crate::core::UpdaterError;
use anyhow::Result;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use sysinfo::System;

/// Answers whether the server of an installation is currently running.
pub trait ProcessTable {
    fn is_server_running(&self, installation: &ServerInstallation) -> bool;
}

/// Process table backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

impl ProcessTable for SystemProcesses {
    fn is_server_running(&self, installation: &ServerInstallation) -> bool {
        let system = System::new_all();

        for (pid, process) in system.processes() {
            let cwd: Option<&Path> = Option::from(process.cwd());
            if command_references_root(process.cmd(), cwd, &installation.root) {
                tracing::debug!(
                    target: "server::running",
                    "Process {} ({}) is running the server",
                    pid,
                    process.name()
                );
                return true;
            }
        }

        false
    }
}

/// Whether a command line starts the server installed in `root`.
pub fn command_references_root<S: AsRef<OsStr>>(
    cmd: &[S],
    cwd: Option<&Path>,
    root: &Path,
) -> bool {
    cmd.iter().map(|arg| Path::new(arg.as_ref())).any(|arg| {
        let is_marker = arg
            .file_name()
            .is_some_and(|name| MARKER_FILES.iter().any(|marker| name == OsStr::new(marker)));
        if !is_marker {
            return false;
        }

        if arg.is_absolute() {
            return arg.parent().is_some_and(|parent| same_dir(parent, root));
        }

        cwd.is_some_and(|cwd| {
            let resolved = normalize(&cwd.join(arg));
            let in_root = resolved.parent().is_some_and(|parent| same_dir(parent, root));
            in_root || cwd.starts_with(root)
        })
    })
}

/// Resolve `.` and `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Fail with [`UpdaterError::ServerRunning`] when the process table shows the server.
pub fn ensure_not_running(
    processes: &dyn ProcessTable,
    installation: &ServerInstallation,
) -> Result<()> {
    if processes.is_server_running(installation) {
        return Err(UpdaterError::ServerRunning {
            root: installation.root.display().to_string(),
        }
        .into());
    }
    Ok(())
}
