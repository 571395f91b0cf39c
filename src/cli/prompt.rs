use crate::core::UpdaterError;
use crate::update::UpdatePlan;
use anyhow::Result;
use colored::Colorize;
use std::io::{self, BufRead, IsTerminal, Write};

/// Ask on the terminal whether to apply `plan`. Defaults to no.
///
/// Without an interactive stdin there is nobody to ask, so the run is aborted
/// and the user is pointed at `--yes`.
pub fn confirm_update(plan: &UpdatePlan) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Err(UpdaterError::Aborted {
            reason: "stdin is not a terminal; pass --yes to update without a prompt".to_string(),
        }
        .into());
    }

    println!("{} {}", "Server:".bold(), plan.root.display());
    println!(
        "{} {} {} {}",
        "Version:".bold(),
        plan.installed_version.as_deref().unwrap_or("unknown").yellow(),
        "->".cyan(),
        plan.new_version.as_deref().unwrap_or("unknown").green()
    );
    print!("{} ", "Apply this update? [y/N]:".green());
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().lock().read_line(&mut response)?;
    Ok(is_yes(&response))
}

fn is_yes(response: &str) -> bool {
    matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
}
