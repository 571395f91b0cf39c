//! Per-run log file that can be attached after logging starts.
//!
//! The log file lives inside the installation, which is only known once the
//! locator has run. [`DeferredLogFile`] is installed as a `tracing-subscriber`
//! writer up front, buffers everything written before a file is attached, and
//! flushes the buffer into the file on [`DeferredLogFile::attach`].

use crate::utils::fs::ensure_dir;
use anyhow::{Context, Result, anyhow};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Upper bound on buffered output before a file is attached.
const MAX_BUFFERED: usize = 1024 * 1024;

#[derive(Default)]
struct State {
    buffer: Vec<u8>,
    file: Option<File>,
    path: Option<PathBuf>,
}

/// Shared handle to the run log. Clones refer to the same file.
#[derive(Clone, Default)]
pub struct DeferredLogFile {
    state: Arc<Mutex<State>>,
}

impl DeferredLogFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the log file at `path` and write everything buffered so far.
    pub fn attach(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        let mut state = self.state.lock().map_err(|_| anyhow!("Log file state poisoned"))?;
        file.write_all(&state.buffer)
            .with_context(|| format!("Failed to write log file {}", path.display()))?;
        state.buffer = Vec::new();
        state.file = Some(file);
        state.path = Some(path.to_path_buf());
        Ok(())
    }

    /// The attached file, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.state.lock().ok().and_then(|state| state.path.clone())
    }

    /// Bytes waiting for a file.
    pub fn buffered_len(&self) -> usize {
        self.state.lock().map(|state| state.buffer.len()).unwrap_or(0)
    }
}

pub struct DeferredLogWriter {
    state: Arc<Mutex<State>>,
}

impl Write for DeferredLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard =
            self.state.lock().map_err(|_| io::Error::other("log file state poisoned"))?;
        let state = &mut *guard;

        match state.file.as_mut() {
            Some(file) => file.write_all(buf)?,
            None if state.buffer.len() + buf.len() <= MAX_BUFFERED => {
                state.buffer.extend_from_slice(buf);
            }
            None => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state =
            self.state.lock().map_err(|_| io::Error::other("log file state poisoned"))?;
        match state.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for DeferredLogFile {
    type Writer = DeferredLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        DeferredLogWriter {
            state: Arc::clone(&self.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_buffer_flushed_on_attach() {
        let temp = tempdir().unwrap();
        let log = DeferredLogFile::new();

        log.make_writer().write_all(b"before attach\n").unwrap();
        assert_eq!(log.buffered_len(), 14);
        assert!(log.path().is_none());

        let path = temp.path().join("logs").join("update-1.log");
        log.attach(&path).unwrap();
        log.make_writer().write_all(b"after attach\n").unwrap();

        assert_eq!(log.buffered_len(), 0);
        assert_eq!(log.path(), Some(path.clone()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "before attach\nafter attach\n");
    }
}
