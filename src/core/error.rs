//! Error handling for the updater
//!
//! This module provides the error taxonomy and user-friendly error reporting for
//! the updater. The error system is designed around two core principles:
//! 1. **Strongly-typed errors** for precise error handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! The error system consists of two main types:
//! - [`UpdaterError`] - Enumerated error types for all fatal conditions of a run
//! - [`ErrorContext`] - Wrapper that adds user-friendly messages and suggestions
//!
//! # Error Categories
//!
//! - **Locator**: [`UpdaterError::ServerNotFound`], [`UpdaterError::DestinationInvalid`],
//!   [`UpdaterError::AmbiguousInstallation`]
//! - **Guards**: [`UpdaterError::ServerRunning`], [`UpdaterError::UpdateInProgress`]
//! - **Downloader**: [`UpdaterError::DownloaderInstallFailed`], [`UpdaterError::DownloaderMissing`]
//! - **Download**: [`UpdaterError::DownloadFailed`], [`UpdaterError::CorruptArchive`]
//! - **Package layout**: [`UpdaterError::ServerSubtreeMissing`]
//! - **File system**: [`UpdaterError::FileSystemError`], [`UpdaterError::PermissionDenied`]
//!
//! Filesystem failures during staging, backup and swap are deliberately not
//! classified further: they surface as [`std::io::Error`] wrapped in `anyhow`
//! context and abort the run at whatever step they happen.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hytale_updater::core::{UpdaterError, user_friendly_error};
//!
//! let error = anyhow::Error::from(UpdaterError::ServerRunning {
//!     root: "/srv/hytale/Server".to_string(),
//! });
//! let ctx = user_friendly_error(error);
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for updater operations
///
/// Each variant corresponds to one fatal condition of an update run. All of
/// them abort the run; none of them is retried by the caller (the downloader
/// retry loop lives inside the fetcher and only reports
/// [`DownloadFailed`](UpdaterError::DownloadFailed) once it gives up).
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// No server installation was found below the search base
    #[error("Server installation not found under {base} (searched {depth} levels deep)")]
    ServerNotFound {
        /// Directory the search started from
        base: String,
        /// Maximum search depth that was used
        depth: usize,
    },

    /// The explicitly provided destination cannot be used
    #[error("Destination is not a valid server installation: {path}")]
    DestinationInvalid {
        /// The destination that was provided
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// More than one installation matched at the same search depth
    #[error("Multiple server installations found: {first} and {second}")]
    AmbiguousInstallation {
        /// First candidate root
        first: String,
        /// Second candidate root
        second: String,
    },

    /// The targeted server is currently executing
    #[error("Server is currently running from {root}")]
    ServerRunning {
        /// Root of the running installation
        root: String,
    },

    /// Another update run holds the installation lock
    #[error("Another update is already in progress (lock held on {lock})")]
    UpdateInProgress {
        /// Path of the lock file
        lock: String,
    },

    /// Fetching or unpacking the downloader distribution failed
    #[error("Failed to install the downloader from {url}")]
    DownloaderInstallFailed {
        /// Where the downloader was fetched from
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The downloader distribution did not contain the expected executable
    #[error("Downloader executable '{binary}' not found in the downloaded distribution")]
    DownloaderMissing {
        /// Expected executable name
        binary: String,
    },

    /// Every download attempt failed
    #[error("Download failed after {attempts} attempts")]
    DownloadFailed {
        /// Number of attempts made
        attempts: u32,
        /// Failure of the last attempt
        reason: String,
    },

    /// The downloaded file is not a readable archive
    #[error("Archive is corrupt or unreadable: {path}")]
    CorruptArchive {
        /// Archive path
        path: String,
        /// Underlying zip error
        reason: String,
    },

    /// The extracted package does not contain the server subtree
    #[error("Update package does not contain the '{subtree}' directory")]
    ServerSubtreeMissing {
        /// Expected subtree name
        subtree: String,
    },

    /// General file system error
    #[error("File system error: {operation}")]
    FileSystemError {
        /// The operation that failed
        operation: String,
        /// The path involved
        path: String,
    },

    /// Insufficient permissions
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// The operation that was denied
        operation: String,
        /// The path involved
        path: String,
    },

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// The run was cancelled before any mutation
    #[error("Update aborted: {reason}")]
    Aborted {
        /// Why the run was aborted
        reason: String,
    },

    /// IO error from the standard library
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Catch-all
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl Clone for UpdaterError {
    fn clone(&self) -> Self {
        match self {
            Self::ServerNotFound {
                base,
                depth,
            } => Self::ServerNotFound {
                base: base.clone(),
                depth: *depth,
            },
            Self::DestinationInvalid {
                path,
                reason,
            } => Self::DestinationInvalid {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::AmbiguousInstallation {
                first,
                second,
            } => Self::AmbiguousInstallation {
                first: first.clone(),
                second: second.clone(),
            },
            Self::ServerRunning {
                root,
            } => Self::ServerRunning {
                root: root.clone(),
            },
            Self::UpdateInProgress {
                lock,
            } => Self::UpdateInProgress {
                lock: lock.clone(),
            },
            Self::DownloaderInstallFailed {
                url,
                reason,
            } => Self::DownloaderInstallFailed {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::DownloaderMissing {
                binary,
            } => Self::DownloaderMissing {
                binary: binary.clone(),
            },
            Self::DownloadFailed {
                attempts,
                reason,
            } => Self::DownloadFailed {
                attempts: *attempts,
                reason: reason.clone(),
            },
            Self::CorruptArchive {
                path,
                reason,
            } => Self::CorruptArchive {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ServerSubtreeMissing {
                subtree,
            } => Self::ServerSubtreeMissing {
                subtree: subtree.clone(),
            },
            Self::FileSystemError {
                operation,
                path,
            } => Self::FileSystemError {
                operation: operation.clone(),
                path: path.clone(),
            },
            Self::PermissionDenied {
                operation,
                path,
            } => Self::PermissionDenied {
                operation: operation.clone(),
                path: path.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::Aborted {
                reason,
            } => Self::Aborted {
                reason: reason.clone(),
            },
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            // toml errors are not Clone
            Self::TomlError(e) => Self::Other {
                message: format!("TOML parsing error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// Wraps an [`UpdaterError`] with an optional suggestion (what to do next) and
/// optional details (why it happened). Rendered by [`ErrorContext::display`]
/// in the binary's error path.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdaterError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpdaterError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Typed [`UpdaterError`]s anywhere in the error chain get tailored guidance.
/// Bare [`std::io::Error`]s get filesystem guidance. Everything else is shown
/// with its full `Caused by` chain, since filesystem failures during the swap
/// are only meaningful together with the step that failed.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(updater_error) =
        error.chain().find_map(|cause| cause.downcast_ref::<UpdaterError>())
    {
        let ctx = create_error_context(updater_error.clone());
        return match ctx.details {
            Some(_) => ctx,
            None => ctx.with_details(render_chain(&error)),
        };
    }

    let bare_io_error =
        if error.chain().count() == 1 { error.downcast_ref::<std::io::Error>() } else { None };

    if let Some(io_error) = bare_io_error {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpdaterError::PermissionDenied {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Run the updater as the user that owns the server directory")
                .with_details("The updater could not read or write a file it needed");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpdaterError::FileSystemError {
                    operation: "file access".to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    ErrorContext::new(UpdaterError::Other {
        message: render_chain(&error),
    })
}

fn render_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    message
}

fn create_error_context(error: UpdaterError) -> ErrorContext {
    match &error {
        UpdaterError::ServerNotFound {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Pass the server directory explicitly: hytale-updater <PATH>")
            .with_details("The updater looks for HytaleServer.jar or HytaleServer.aot in the current directory and a few levels below it"),

        UpdaterError::DestinationInvalid {
            reason,
            ..
        } => {
            let details = reason.clone();
            ErrorContext::new(error)
                .with_suggestion("Point at the directory containing HytaleServer.jar, or pass --lenient-destination to accept it as-is")
                .with_details(details)
        }

        UpdaterError::AmbiguousInstallation {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Pass the server directory you want to update explicitly"),

        UpdaterError::ServerRunning {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Stop the server and run the updater again")
            .with_details("Nothing was changed on disk"),

        UpdaterError::UpdateInProgress {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Wait for the other run to finish; the lock is released when it exits"),

        UpdaterError::DownloaderInstallFailed {
            reason,
            ..
        } => {
            let details = reason.clone();
            ErrorContext::new(error)
                .with_suggestion("Check your internet connection, or place the downloader next to the updater manually")
                .with_details(details)
        }

        UpdaterError::DownloaderMissing {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Download the downloader manually and place it next to the updater"),

        UpdaterError::DownloadFailed {
            reason,
            ..
        } => {
            let details = reason.clone();
            ErrorContext::new(error)
                .with_suggestion("Run the downloader by hand to check authentication, then retry")
                .with_details(details)
        }

        UpdaterError::CorruptArchive {
            reason,
            ..
        } => {
            let details = reason.clone();
            ErrorContext::new(error).with_details(details)
        }

        UpdaterError::ServerSubtreeMissing {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("The package layout is unexpected; check for a newer updater release")
            .with_details("Nothing was installed"),

        UpdaterError::PermissionDenied {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Run the updater as the user that owns the server directory"),

        UpdaterError::ConfigError {
            ..
        }
        | UpdaterError::TomlError(_) => ErrorContext::new(error)
            .with_suggestion("Fix the configuration file or remove it to use defaults"),

        _ => ErrorContext::new(error),
    }
}
