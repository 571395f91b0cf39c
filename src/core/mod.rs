//! Core types for the updater
//!
//! The core module holds the error taxonomy shared by every stage of a run.
//! Every stage returns `anyhow::Result`; fatal conditions with a meaning of
//! their own are raised as [`UpdaterError`] so the CLI can attach guidance via
//! [`user_friendly_error`].

pub mod error;

pub use error::{ErrorContext, UpdaterError, user_friendly_error};
