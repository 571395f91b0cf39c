use crate::constants::{
    CONFIG_ENV_VAR, CONFIG_FILE_NAME, DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_RETENTION,
    DEFAULT_RETRY_DELAY, DEFAULT_SEARCH_DEPTH, DOWNLOAD_PATH_FLAG, DOWNLOADER_URL,
};
use crate::core::UpdaterError;
use crate::download::FetchConfig;
use crate::server::DestinationValidation;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Tunable settings for an update run.
///
/// Every field has a default, so an empty or missing file yields the stock
/// behavior. Command line flags override what is loaded here.
///
/// # Lookup order
///
/// 1. `--config PATH` (must exist)
/// 2. `HYTALE_UPDATER_CONFIG` (must exist)
/// 3. `hytale-updater.toml` next to the updater executable (optional)
///
/// # TOML Example
///
/// ```toml
/// download_attempts = 5
/// retry_delay_secs = 10
/// keep_backups = 5
/// tool_dir = "/opt/hytale/tools"
/// destination_validation = "lenient"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Where the downloader distribution zip is fetched from when the
    /// downloader binary is missing.
    #[serde(default = "default_downloader_url")]
    pub downloader_url: String,

    /// Total downloader invocations before the run fails.
    ///
    /// # Default: `3`
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,

    /// Seconds to wait between failed download attempts.
    ///
    /// # Default: `2`
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Flag the downloader expects in front of the destination path.
    #[serde(default = "default_download_path_flag")]
    pub download_path_flag: String,

    /// How many directory levels below the working directory are searched
    /// for a server when no destination is given.
    ///
    /// # Default: `4`
    #[serde(default = "default_search_depth")]
    pub search_depth: usize,

    /// Backups kept after a successful update. The current run's backup is
    /// always kept.
    #[serde(default = "default_retention")]
    pub keep_backups: usize,

    /// Per-run log files kept after a successful update.
    #[serde(default = "default_retention")]
    pub keep_logs: usize,

    /// Directory holding the downloader. Defaults to the directory of the
    /// updater executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_dir: Option<PathBuf>,

    /// How an explicit destination is checked.
    #[serde(default)]
    pub destination_validation: DestinationValidation,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            downloader_url: default_downloader_url(),
            download_attempts: default_download_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            download_path_flag: default_download_path_flag(),
            search_depth: default_search_depth(),
            keep_backups: default_retention(),
            keep_logs: default_retention(),
            tool_dir: None,
            destination_validation: DestinationValidation::default(),
        }
    }
}

impl UpdateConfig {
    /// Load using the lookup order, falling back to defaults when no file is
    /// found. Returns the file that was used, if any.
    ///
    /// # Errors
    ///
    /// - An explicit or environment-provided path that does not exist
    /// - A file that cannot be read or parsed
    /// - Values that fail [`UpdateConfig::validate`]
    pub async fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Self::load_required(path).await.map(|config| (config, Some(path.into())));
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            return Self::load_required(&path).await.map(|config| (config, Some(path)));
        }

        match executable_dir().map(|dir| dir.join(CONFIG_FILE_NAME)) {
            Some(path) if path.is_file() => {
                let config = Self::load_from(&path).await?;
                Ok((config, Some(path)))
            }
            _ => Ok((Self::default(), None)),
        }
    }

    async fn load_required(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(UpdaterError::ConfigError {
                message: format!("Config file not found: {}", path.display()),
            }
            .into());
        }
        Self::load_from(path).await
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .map_err(UpdaterError::from)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.download_attempts == 0 {
            return Err(UpdaterError::ConfigError {
                message: "download_attempts must be at least 1".to_string(),
            }
            .into());
        }
        if self.downloader_url.trim().is_empty() {
            return Err(UpdaterError::ConfigError {
                message: "downloader_url must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Directory the downloader lives in.
    pub fn resolved_tool_dir(&self) -> PathBuf {
        self.tool_dir
            .clone()
            .or_else(executable_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Settings for the fetch phase.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            downloader_url: self.downloader_url.clone(),
            tool_dir: self.resolved_tool_dir(),
            attempts: self.download_attempts,
            retry_delay: self.retry_delay(),
            download_path_flag: self.download_path_flag.clone(),
        }
    }
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn default_downloader_url() -> String {
    DOWNLOADER_URL.to_string()
}

const fn default_download_attempts() -> u32 {
    DEFAULT_DOWNLOAD_ATTEMPTS
}

const fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY.as_secs()
}

fn default_download_path_flag() -> String {
    DOWNLOAD_PATH_FLAG.to_string()
}

const fn default_search_depth() -> usize {
    DEFAULT_SEARCH_DEPTH
}

const fn default_retention() -> usize {
    DEFAULT_RETENTION
}
