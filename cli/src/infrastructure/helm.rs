//! Helm operations
//!
//! Chart introspection (`helm show`), repository registration and OCI chart
//! transfer (`helm pull` / `helm push`). Subchart metadata is read from a
//! pulled copy of the parent chart unpacked into a throwaway directory.

use async_trait::async_trait;
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::ChartMetadata;
use crate::error::CommandError;
use crate::infrastructure::command::CommandRunner;
use crate::infrastructure::secrets::Credentials;
use crate::tools::tools;

/// `helm show` subcommand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    Chart,
    Values,
}

impl fmt::Display for ShowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chart => "chart",
            Self::Values => "values",
        })
    }
}

/// Read-only chart introspection used while resolving workloads
#[async_trait]
pub trait ChartInfoProvider: Send + Sync {
    async fn show(&self, kind: ShowKind, chart: &str, version: &str)
        -> Result<Value, CommandError>;

    /// Chart and values of `subchart`, as bundled in `chart` at `version`
    async fn show_subchart(
        &self,
        chart: &str,
        subchart: &str,
        version: &str,
    ) -> Result<ChartMetadata, CommandError>;

    async fn add_repo(
        &self,
        alias: &str,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), CommandError>;

    async fn update_repos(&self) -> Result<(), CommandError>;
}

/// Chart transfer used by the chart replication run
#[async_trait]
pub trait ChartTool: Send + Sync {
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<(), CommandError>;

    /// Download the packaged chart into `workdir`, returning the `.tgz` path
    async fn pull(
        &self,
        reference: &str,
        version: &str,
        workdir: &Path,
    ) -> Result<PathBuf, CommandError>;

    async fn push(&self, package: &Path, target: &str) -> Result<(), CommandError>;
}

/// Helm CLI client
pub struct HelmClient {
    runner: CommandRunner,
}

impl HelmClient {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn show_path(&self, kind: ShowKind, path: &Path) -> Result<Value, CommandError> {
        let kind_arg = kind.to_string();
        let path_arg = path.display().to_string();
        let output = self
            .runner
            .run(tools::HELM, &["show", kind_arg.as_str(), path_arg.as_str()])
            .await?;
        parse_yaml_output(&format!("helm show {} {}", kind, path_arg), &output.stdout)
    }
}

#[async_trait]
impl ChartInfoProvider for HelmClient {
    async fn show(
        &self,
        kind: ShowKind,
        chart: &str,
        version: &str,
    ) -> Result<Value, CommandError> {
        let kind_arg = kind.to_string();
        let output = self
            .runner
            .run(
                tools::HELM,
                &["show", kind_arg.as_str(), chart, "--version", version],
            )
            .await?;
        parse_yaml_output(&format!("helm show {} {}", kind, chart), &output.stdout)
    }

    async fn show_subchart(
        &self,
        chart: &str,
        subchart: &str,
        version: &str,
    ) -> Result<ChartMetadata, CommandError> {
        let workdir = tempfile::tempdir().map_err(|source| CommandError::Io {
            command: "create chart workdir".to_string(),
            source,
        })?;
        let untardir = workdir.path().display().to_string();

        self.runner
            .run(
                tools::HELM,
                &[
                    "pull",
                    chart,
                    "--version",
                    version,
                    "--untar",
                    "--untardir",
                    untardir.as_str(),
                ],
            )
            .await?;

        let chart_name = chart.rsplit('/').next().unwrap_or(chart);
        let charts_dir = workdir.path().join(chart_name).join("charts");
        let subchart_path =
            locate_subchart(&charts_dir, subchart).ok_or_else(|| CommandError::InvalidOutput {
                command: format!("helm pull {}", chart),
                message: format!("subchart {} is not bundled with {}", subchart, chart_name),
            })?;
        debug!("Reading subchart from {}", subchart_path.display());

        let chart_yaml = self.show_path(ShowKind::Chart, &subchart_path).await?;
        let values = self.show_path(ShowKind::Values, &subchart_path).await?;
        Ok(ChartMetadata::new(chart_yaml, values))
    }

    async fn add_repo(
        &self,
        alias: &str,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), CommandError> {
        match credentials {
            Some(creds) => {
                self.runner
                    .run_with_input(
                        tools::HELM,
                        &[
                            "repo",
                            "add",
                            alias,
                            url,
                            "--force-update",
                            "--username",
                            creds.username.as_str(),
                            "--password-stdin",
                        ],
                        &creds.password,
                    )
                    .await?
            }
            None => {
                self.runner
                    .run(tools::HELM, &["repo", "add", alias, url, "--force-update"])
                    .await?
            }
        };
        Ok(())
    }

    async fn update_repos(&self) -> Result<(), CommandError> {
        self.runner.run(tools::HELM, &["repo", "update"]).await?;
        Ok(())
    }
}

#[async_trait]
impl ChartTool for HelmClient {
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<(), CommandError> {
        self.runner
            .run_with_input(
                tools::HELM,
                &[
                    "registry",
                    "login",
                    registry,
                    "--username",
                    credentials.username.as_str(),
                    "--password-stdin",
                ],
                &credentials.password,
            )
            .await?;
        Ok(())
    }

    async fn pull(
        &self,
        reference: &str,
        version: &str,
        workdir: &Path,
    ) -> Result<PathBuf, CommandError> {
        // The package lands in the working directory
        self.runner
            .run_in(tools::HELM, &["pull", reference, "--version", version], workdir)
            .await?;

        find_package(workdir).ok_or_else(|| CommandError::InvalidOutput {
            command: format!("helm pull {}", reference),
            message: format!("no chart package written to {}", workdir.display()),
        })
    }

    async fn push(&self, package: &Path, target: &str) -> Result<(), CommandError> {
        let package_arg = package.display().to_string();
        self.runner
            .run(tools::HELM, &["push", package_arg.as_str(), target])
            .await?;
        Ok(())
    }
}

fn parse_yaml_output(command: &str, stdout: &str) -> Result<Value, CommandError> {
    serde_yaml::from_str(stdout).map_err(|e| CommandError::InvalidOutput {
        command: command.to_string(),
        message: e.to_string(),
    })
}

/// Bundled subcharts are either unpacked directories or `<name>-<version>.tgz`
fn locate_subchart(charts_dir: &Path, subchart: &str) -> Option<PathBuf> {
    let unpacked = charts_dir.join(subchart);
    if unpacked.is_dir() {
        return Some(unpacked);
    }

    let prefix = format!("{}-", subchart);
    std::fs::read_dir(charts_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".tgz"))
        })
}

fn find_package(workdir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(workdir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| path.extension().is_some_and(|ext| ext == "tgz"))
}
