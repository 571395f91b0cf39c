//! Server package retrieval.
//!
//! The updater never talks to the package host directly. It drives the
//! external downloader tool, which handles authentication and its own network
//! retries, and only judges the result: exit status, presence of the output
//! file, and whether that file is a readable zip archive.
//!
//! # Attempt policy
//!
//! Each attempt runs the downloader once with a fresh destination path. An
//! attempt fails on a non-zero exit, a missing output file or a corrupt
//! archive. Failed attempts are retried after a fixed delay until the attempt
//! budget is spent, then [`UpdaterError::DownloadFailed`] is returned.
//!
//! # Output handling
//!
//! stdout and stderr are read concurrently and split into lines, which go
//! through [`OutputParser`]. Plain lines are forwarded to the log under the
//! `downloader` target, every event goes to the optional event sink (the CLI
//! uses it for the progress bar).

pub mod archive;
pub mod downloader;
pub mod events;

use crate::constants::{
    DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_RETRY_DELAY, DOWNLOAD_PATH_FLAG, DOWNLOADER_URL,
    PACKAGE_FILE,
};
use crate::core::UpdaterError;
use anyhow::{Context, Result, anyhow, bail};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

pub use archive::{extract_archive, sha256_file, validate_archive};
pub use downloader::DownloaderInstall;
pub use events::{DownloaderEvent, LineSplitter, OutputParser};

/// Callback receiving every downloader event.
pub type EventSink = Arc<dyn Fn(&DownloaderEvent) + Send + Sync>;

/// Settings for the fetch phase.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Where the downloader distribution is fetched from when missing.
    pub downloader_url: String,
    /// Directory holding the downloader binary; also its working directory.
    pub tool_dir: PathBuf,
    /// Total number of downloader invocations before giving up.
    pub attempts: u32,
    /// Delay between failed attempts.
    pub retry_delay: Duration,
    /// Flag preceding the destination path on the downloader command line.
    pub download_path_flag: String,
}

impl FetchConfig {
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader_url: DOWNLOADER_URL.to_string(),
            tool_dir: tool_dir.into(),
            attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            download_path_flag: DOWNLOAD_PATH_FLAG.to_string(),
        }
    }
}

/// A validated package archive ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    pub path: PathBuf,
    /// Version reported by the successful attempt, if it printed one.
    pub version: Option<String>,
    /// Number of downloader invocations it took.
    pub attempts: u32,
    /// Hex SHA-256 of the archive.
    pub sha256: String,
}

/// Runs the downloader with retry and validates what it produces.
pub struct ArchiveFetcher {
    config: FetchConfig,
    sink: Option<EventSink>,
}

impl ArchiveFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            sink: None,
        }
    }

    /// Receive downloader events as they are parsed.
    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Find the downloader, reserving a scratch directory when it has to be
    /// installed.
    pub fn prepare_downloader(&self) -> Result<DownloaderInstall> {
        DownloaderInstall::prepare(&self.config.tool_dir)
    }

    /// Install the downloader if [`ArchiveFetcher::prepare_downloader`] found
    /// it missing.
    pub async fn install_downloader(&self, install: &DownloaderInstall) -> Result<()> {
        install.install(&self.config.downloader_url).await
    }

    /// Download the package into `temp_root` using `binary`.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::DownloadFailed`] once every attempt has failed. The
    /// reason carries the last attempt's failure.
    pub async fn fetch(&self, binary: &Path, temp_root: &Path) -> Result<FetchedArchive> {
        let package = temp_root.join(PACKAGE_FILE);
        let attempts = self.config.attempts.max(1);
        let counter = AtomicU32::new(0);

        let strategy =
            FixedInterval::new(self.config.retry_delay).take(attempts.saturating_sub(1) as usize);

        let result = Retry::spawn(strategy, || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let package = package.clone();
            async move {
                info!("Download attempt {}/{}", attempt, attempts);
                self.attempt(binary, &package).await.map_err(|e| {
                    warn!("Download attempt {}/{} failed: {:#}", attempt, attempts, e);
                    e
                })
            }
        })
        .await;

        let used = counter.load(Ordering::SeqCst);
        match result {
            Ok(version) => {
                let hash_path = package.clone();
                let sha256 = tokio::task::spawn_blocking(move || sha256_file(&hash_path))
                    .await
                    .context("Checksum task panicked")??;
                info!("Downloaded package {} (sha256 {})", package.display(), sha256);

                Ok(FetchedArchive {
                    path: package,
                    version,
                    attempts: used,
                    sha256,
                })
            }
            Err(e) => Err(UpdaterError::DownloadFailed {
                attempts: used,
                reason: format!("{e:#}"),
            }
            .into()),
        }
    }

    /// One downloader invocation. Returns the version it reported.
    async fn attempt(&self, binary: &Path, package: &Path) -> Result<Option<String>> {
        if package.exists() {
            tokio::fs::remove_file(package).await.with_context(|| {
                format!("Failed to remove stale package {}", package.display())
            })?;
        }

        debug!(
            target: "downloader",
            "Executing: {} {} {}",
            binary.display(),
            self.config.download_path_flag,
            package.display()
        );

        let mut child = Command::new(binary)
            .arg(&self.config.download_path_flag)
            .arg(package)
            .current_dir(&self.config.tool_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start downloader {}", binary.display()))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("Downloader stdout unavailable"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("Downloader stderr unavailable"))?;

        let mut parser = OutputParser::new();
        let mut version = None;
        self.pump_output(stdout, stderr, |line| {
            for event in parser.parse_line(line) {
                self.dispatch(&event);
                if let DownloaderEvent::VersionDetected(v) = event {
                    version = Some(v);
                }
            }
        })
        .await?;

        let status = child.wait().await.context("Failed to wait for downloader")?;
        if !status.success() {
            bail!("Downloader exited with {}", status);
        }

        if !package.is_file() {
            bail!("Downloader finished but {} was not created", package.display());
        }

        let check_path = package.to_path_buf();
        tokio::task::spawn_blocking(move || validate_archive(&check_path))
            .await
            .context("Archive validation task panicked")??;

        Ok(version)
    }

    /// Read both pipes to the end, calling `on_line` for every line.
    async fn pump_output<O, E>(
        &self,
        mut stdout: O,
        mut stderr: E,
        mut on_line: impl FnMut(&str),
    ) -> Result<()>
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_lines = LineSplitter::new();
        let mut err_lines = LineSplitter::new();
        let mut out_done = false;
        let mut err_done = false;

        while !(out_done && err_done) {
            tokio::select! {
                read = stdout.read(&mut out_buf), if !out_done => {
                    let n = read.context("Failed to read downloader stdout")?;
                    if n == 0 {
                        out_done = true;
                        out_lines.finish().iter().for_each(|line| on_line(line));
                    } else {
                        out_lines.push(&out_buf[..n]).iter().for_each(|line| on_line(line));
                    }
                }
                read = stderr.read(&mut err_buf), if !err_done => {
                    let n = read.context("Failed to read downloader stderr")?;
                    if n == 0 {
                        err_done = true;
                        err_lines.finish().iter().for_each(|line| on_line(line));
                    } else {
                        err_lines.push(&err_buf[..n]).iter().for_each(|line| on_line(line));
                    }
                }
            }
        }

        Ok(())
    }

    fn dispatch(&self, event: &DownloaderEvent) {
        match event {
            DownloaderEvent::Line(line) => info!(target: "downloader", "{}", line),
            DownloaderEvent::VersionDetected(version) => {
                info!("Downloader reports version {}", version);
            }
            DownloaderEvent::Progress(percent) => {
                tracing::trace!(target: "downloader", "Progress {:.1}%", percent);
            }
        }

        if let Some(sink) = &self.sink {
            sink(event);
        }
    }
}
