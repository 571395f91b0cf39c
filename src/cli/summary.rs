//! Final report printed after a successful run.

use crate::update::cleanup::CleanupOutcome;
use crate::update::{RunReport, RunStatus};
use colored::Colorize;

pub fn print(report: &RunReport) {
    for line in render(report) {
        println!("{line}");
    }
}

fn render(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    let version = report.version.as_deref().unwrap_or("unknown");

    match report.status {
        RunStatus::UpToDate => {
            lines.push(format!("{} Server is up to date ({})", "✓".green(), version));
            return lines;
        }
        RunStatus::Updated => {
            lines.push(format!("{} Update complete ({})", "✓".green(), version.bold()));
        }
        RunStatus::DryRun => {
            lines.push(format!("{} Dry run, nothing was changed ({})", "ℹ".cyan(), version));
        }
    }

    if let Some(previous) = &report.previous_version {
        lines.push(format!("  Previous version: {previous}"));
    }

    let verb = if report.status == RunStatus::DryRun { "Would update" } else { "Updated" };
    lines.push(format!("  {} {} entries:", verb, report.changed.len()));
    for name in &report.changed {
        let marker = if report.replaced.contains(name) { "~".yellow() } else { "+".green() };
        lines.push(format!("    {marker} {name}"));
    }

    if let Some(target) = &report.assets_target {
        lines.push(format!("  Assets: {}", target.display()));
    }
    if let Some(backup) = &report.backup_dir {
        lines.push(format!("  Backup: {}", backup.display()));
    }
    if let Some(sha) = &report.sha256 {
        lines.push(format!("  Package sha256: {}", sha.dimmed()));
    }
    if let Some(log) = &report.log_file {
        lines.push(format!("  Log: {}", log.display()));
    }
    if !report.pruned.is_empty() {
        lines.push(format!("  Pruned {} old backup(s)/log(s)", report.pruned.len()));
    }
    if let CleanupOutcome::Retained(paths) = &report.cleanup {
        for path in paths {
            lines.push(format!("  {} Left in place: {}", "!".yellow(), path.display()));
        }
    }

    lines
}
