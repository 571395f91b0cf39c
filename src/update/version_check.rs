use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The persisted version of the installed server.
///
/// Stored as the raw version string without a trailing newline and compared
/// byte for byte; no version ordering is implied.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    path: PathBuf,
}

impl VersionRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded version, or `None` when nothing was recorded yet.
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read version record {}", self.path.display())),
        }
    }

    pub fn write(&self, version: &str) -> Result<()> {
        atomic_write(&self.path, version.as_bytes()).with_context(|| {
            format!("Failed to write version record {}", self.path.display())
        })?;
        debug!("Recorded version {} in {}", version, self.path.display());
        Ok(())
    }
}

/// Why the gate let the run through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProceedReason {
    /// The downloader did not print a version.
    VersionUnknown,
    /// Nothing recorded yet.
    NoRecord,
    /// Recorded and reported versions differ.
    Changed {
        from: String,
        to: String,
    },
}

impl fmt::Display for ProceedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionUnknown => write!(f, "downloader did not report a version"),
            Self::NoRecord => write!(f, "no version recorded yet"),
            Self::Changed {
                from,
                to,
            } => write!(f, "{from} -> {to}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The installed version equals the reported one; nothing to do.
    UpToDate(String),
    Proceed(ProceedReason),
}

/// Decide whether an update is needed.
pub fn evaluate(detected: Option<&str>, recorded: Option<&str>) -> GateDecision {
    let decision = match (detected, recorded) {
        (None, _) => GateDecision::Proceed(ProceedReason::VersionUnknown),
        (Some(_), None) => GateDecision::Proceed(ProceedReason::NoRecord),
        (Some(detected), Some(recorded)) if detected == recorded => {
            GateDecision::UpToDate(detected.to_string())
        }
        (Some(detected), Some(recorded)) => GateDecision::Proceed(ProceedReason::Changed {
            from: recorded.to_string(),
            to: detected.to_string(),
        }),
    };

    match &decision {
        GateDecision::UpToDate(version) => info!("Server is up to date ({})", version),
        GateDecision::Proceed(reason) => info!("Update needed: {}", reason),
    }

    decision
}
