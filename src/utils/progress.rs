//! Progress bar for the download phase.
//!
//! Wraps `indicatif` with the updater's styling. Bars are hidden when the
//! `HYTALE_UPDATER_NO_PROGRESS` environment variable is set, which the CLI
//! does for `--no-progress`, so callers never need to branch on it.

use crate::constants::NO_PROGRESS_ENV_VAR;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV_VAR).is_ok()
}

/// A progress bar with consistent styling.
///
/// Cloning is cheap and clones share the same underlying bar, which lets the
/// downloader output handler update it from a callback.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a percentage bar (0 to 100) for the download phase.
    pub fn new_percent() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(100);
            bar.set_style(percent_style());
            bar
        };
        Self {
            inner: bar,
        }
    }

    /// A bar that never draws anything.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Sets the position from a percentage, clamped to 0..=100.
    pub fn set_percent(&self, percent: f32) {
        self.inner.set_position(percent.clamp(0.0, 100.0).round() as u64);
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn percent_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}
