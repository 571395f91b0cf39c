//! Global constants used throughout the updater.
//!
//! File names, directory layout and default tuning values live here so the
//! locator, fetcher and update engine agree on a single source of truth.

use std::time::Duration;

/// Marker file present in a jar-based server installation.
pub const JAR_MARKER: &str = "HytaleServer.jar";

/// Marker file present in an ahead-of-time compiled server installation.
pub const AOT_MARKER: &str = "HytaleServer.aot";

/// Both markers, jar first. Either one identifies an installation.
pub const MARKER_FILES: [&str; 2] = [JAR_MARKER, AOT_MARKER];

/// Top-level entries in the server root that an update never touches.
pub const PRESERVED_ENTRIES: [&str; 9] = [
    "mods",
    "universe",
    "logs",
    "config.json",
    "bans.json",
    "permissions.json",
    "whitelist.json",
    "auth.enc",
    ".hytale-downloader-credentials.json",
];

/// Maintenance directory inside the server root holding updater state.
pub const MAINTENANCE_DIR: &str = ".hytale-updater";

/// Version record file name inside the maintenance directory.
pub const VERSION_FILE: &str = "version.txt";

/// Staging directory name inside the maintenance directory.
pub const STAGING_DIR: &str = "staging";

/// Parent directory of per-run backups inside the maintenance directory.
pub const BACKUPS_DIR: &str = "backups";

/// Per-run log directory inside the maintenance directory.
pub const LOGS_DIR: &str = "logs";

/// Advisory lock file inside the maintenance directory.
pub const LOCK_FILE: &str = "update.lock";

/// Prefix of backup directory names.
pub const BACKUP_PREFIX: &str = "backup-";

/// Prefix of per-run log file names.
pub const LOG_PREFIX: &str = "update-";

/// Timestamp format used in backup and log names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// Subtree of the update package holding the new server files.
pub const SERVER_SUBTREE: &str = "Server";

/// Auxiliary assets bundle shipped beside the server subtree.
pub const ASSETS_BUNDLE: &str = "Assets.zip";

/// File name the downloader is asked to write the package to.
pub const PACKAGE_FILE: &str = "server-package.zip";

/// Fixed location of the downloader distribution archive.
pub const DOWNLOADER_URL: &str = "https://downloader.hytale.com/hytale-downloader.zip";

/// Downloader flag that takes the destination file path.
pub const DOWNLOAD_PATH_FLAG: &str = "-download-path";

/// Platform specific downloader executable name.
#[cfg(windows)]
pub const DOWNLOADER_BINARY: &str = "hytale-downloader-windows-amd64.exe";

/// Platform specific downloader executable name.
#[cfg(not(windows))]
pub const DOWNLOADER_BINARY: &str = "hytale-downloader-linux-amd64";

/// Default number of download attempts before giving up.
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;

/// Default delay between download attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default depth of the recursive marker search.
pub const DEFAULT_SEARCH_DEPTH: usize = 4;

/// Default number of backups and log files kept after a successful run.
pub const DEFAULT_RETENTION: usize = 3;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HYTALE_UPDATER_CONFIG";

/// Config file name looked up beside the executable.
pub const CONFIG_FILE_NAME: &str = "hytale-updater.toml";

/// Environment variable that disables progress bars when set.
pub const NO_PROGRESS_ENV_VAR: &str = "HYTALE_UPDATER_NO_PROGRESS";
