use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cli::{BatchArgs, SecretArgs, TargetArgs};
use crate::config::read_json_input;
use crate::domain::ReplicationTask;
use crate::infrastructure::{CommandRunner, DockerClient, EcrClient};
use crate::services::{ExecutorSettings, ReplicationExecutor};
use crate::tools::{ensure_available, tools};
use crate::ui;

/// Replicate the image worklist written by `resolve`
pub async fn execute(
    input: PathBuf,
    batch: BatchArgs,
    secret: SecretArgs,
    target: TargetArgs,
) -> Result<()> {
    ui::print_header("Replicating images");

    let tasks: Vec<ReplicationTask> = read_json_input(&input)?;
    let target = target.into_config()?;
    info!("{} images to replicate into {}", tasks.len(), target.host());

    ensure_available(tools::AWS)?;
    ensure_available(tools::DOCKER)?;

    let runner = CommandRunner::new().with_timeout(batch.command_timeout);
    let source_credentials =
        super::source_credentials(&secret, Some(target.region.as_str()), &runner).await?;

    let registry = Arc::new(EcrClient::new(target, runner.clone()));
    let executor = ReplicationExecutor::new(
        registry,
        ExecutorSettings {
            workers: batch.workers,
            source_credentials,
        },
    );

    let report = executor
        .replicate_images(Arc::new(DockerClient::new(runner)), tasks)
        .await
        .context("Cannot replicate images without a registry login")?;

    ui::print_report("images", &report);
    Ok(())
}
