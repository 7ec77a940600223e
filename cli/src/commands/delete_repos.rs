use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::TargetArgs;
use crate::infrastructure::{CommandRunner, EcrClient, RegistryClient};
use crate::services::delete_repositories;
use crate::tools::{ensure_available, tools};
use crate::ui;

/// Delete every mirrored repository under `prefix`
pub async fn execute(prefix: String, target: TargetArgs) -> Result<()> {
    ui::print_header("Deleting mirrored repositories");

    let target = target.into_config()?;
    ensure_available(tools::AWS)?;

    let registry = EcrClient::new(target, CommandRunner::new());
    ui::print_info(&format!(
        "Deleting repositories starting with '{}' from {}",
        prefix,
        registry.host()
    ));

    let report = delete_repositories(&registry, &prefix)
        .await
        .context("Failed to list repositories")?;

    for name in &report.deleted {
        println!("  {} {}", "deleted".bright_green(), name);
    }
    for (name, reason) in &report.failed {
        println!("  {} {}: {}", "failed".bright_red(), name, reason);
    }

    if report.failed.is_empty() {
        ui::print_success(&format!("Deleted {} repositories", report.deleted.len()));
    } else {
        ui::print_warning(&format!(
            "Deleted {} repositories, {} could not be deleted",
            report.deleted.len(),
            report.failed.len()
        ));
    }
    Ok(())
}
