use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod services;
mod tools;
mod ui;

use cli::{Cli, Commands};
use commands::{delete_repos, replicate_charts, replicate_images, resolve};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .init();

    // Execute command
    match cli.command {
        Commands::Resolve {
            eks_version,
            versions_directory,
            registry_prefix,
            update_helm_repos,
            output_dir,
            secret,
            target,
        } => {
            resolve::execute(
                eks_version,
                versions_directory,
                registry_prefix,
                update_helm_repos,
                output_dir,
                secret,
                target,
            )
            .await?;
        }
        Commands::ReplicateImages {
            input,
            batch,
            secret,
            target,
        } => {
            replicate_images::execute(input, batch, secret, target).await?;
        }
        Commands::ReplicateCharts {
            input,
            batch,
            secret,
            target,
        } => {
            replicate_charts::execute(input, batch, secret, target).await?;
        }
        Commands::DeleteRepos { prefix, target } => {
            delete_repos::execute(prefix, target).await?;
        }
    }

    Ok(())
}
