// Terminal UI utilities

use colored::Colorize;
use std::fmt::Display;

use crate::domain::{ReplicationOutcome, ReplicationReport};

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// Print a batch report as two labeled lists followed by a one-line verdict
pub fn print_report<T: Display>(kind: &str, report: &ReplicationReport<T>) {
    println!();
    println!(
        "{}",
        "════════════════════════════════════════════════════════════".bright_blue()
    );

    println!("{}", format!("Successfully replicated {}:", kind).bold());
    if report.succeeded.is_empty() {
        println!("  NONE");
    }
    for outcome in &report.succeeded {
        match outcome {
            ReplicationOutcome::Skipped { task, reason } => {
                println!("  {} {}", task, format!("({})", reason).dimmed())
            }
            other => println!("  {}", other.task()),
        }
    }

    println!();
    println!("{}", format!("FAILED replicated {}:", kind).bold());
    if report.failed.is_empty() {
        println!("  NONE");
    }
    for outcome in &report.failed {
        if let ReplicationOutcome::Failed { task, reason } = outcome {
            println!("  {}", task.to_string().bright_red());
            println!("    {}", reason);
        }
    }

    println!(
        "{}",
        "════════════════════════════════════════════════════════════".bright_blue()
    );

    let summary = format!(
        "{} of {} {} replicated ({} already present)",
        report.succeeded.len(),
        report.total(),
        kind,
        report.skipped()
    );
    if report.is_clean() {
        print_success(&summary);
    } else {
        print_warning(&format!("{}, {} failed", summary, report.failed.len()));
    }
}
