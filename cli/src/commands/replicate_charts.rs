use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cli::{BatchArgs, SecretArgs, TargetArgs};
use crate::config::read_json_input;
use crate::domain::{ChartTask, ReplicationResult};
use crate::infrastructure::{CommandRunner, EcrClient, HelmClient};
use crate::services::{ExecutorSettings, ReplicationExecutor};
use crate::tools::{ensure_available, tools};
use crate::ui;

/// Replicate the rewritten charts from `replication-result.json`
pub async fn execute(
    input: PathBuf,
    batch: BatchArgs,
    secret: SecretArgs,
    target: TargetArgs,
) -> Result<()> {
    ui::print_header("Replicating charts");

    let result: ReplicationResult = read_json_input(&input)?;
    let tasks = chart_tasks(&result);
    if tasks.is_empty() {
        ui::print_info("No charts to replicate");
        return Ok(());
    }

    let target = target.into_config()?;
    info!("{} charts to replicate into {}", tasks.len(), target.host());

    ensure_available(tools::AWS)?;
    ensure_available(tools::HELM)?;

    // Older Helm releases gate OCI support behind this flag
    let runner = CommandRunner::new()
        .with_timeout(batch.command_timeout)
        .with_env("HELM_EXPERIMENTAL_OCI", "1");
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
        .replicate_charts(Arc::new(HelmClient::new(runner)), tasks)
        .await
        .context("Cannot replicate charts without a registry login")?;

    ui::print_report("charts", &report);
    Ok(())
}

/// One task per chart in the result document, in workload order
fn chart_tasks(result: &ReplicationResult) -> Vec<ChartTask> {
    result
        .charts
        .iter()
        .map(|(workload, chart)| ChartTask::from_chart_values(workload.as_str(), chart))
        .collect()
}
