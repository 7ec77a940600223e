//! Target registry operations
//!
//! Drives the `aws ecr` CLI. Logins fetch a short-lived password with
//! `aws ecr get-login-password` and pipe it into `docker login` or
//! `helm registry login` via `--password-stdin`.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

use crate::config::TargetRegistryConfig;
use crate::error::{CommandError, LoginError, RegistryError};
use crate::infrastructure::command::CommandRunner;
use crate::tools::tools;

const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";
const REPOSITORY_ALREADY_EXISTS: &str = "RepositoryAlreadyExistsException";
const IMAGE_NOT_FOUND: &str = "ImageNotFound";

/// Which client a registry login is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    Docker,
    Helm,
}

impl fmt::Display for LoginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Docker => "docker",
            Self::Helm => "helm",
        })
    }
}

/// Private registry capability used by the executor and cleanup
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Registry host, without scheme
    fn host(&self) -> String;

    async fn login(&self, kind: LoginKind) -> Result<(), LoginError>;

    async fn repository_exists(&self, name: &str) -> Result<bool, RegistryError>;

    /// Create with scan-on-push enabled. Reports
    /// [`RegistryError::AlreadyExists`] when another writer won the race.
    async fn create_repository(&self, name: &str) -> Result<(), RegistryError>;

    async fn image_exists(&self, name: &str, tag: &str) -> Result<bool, RegistryError>;

    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError>;

    /// Delete a repository and every image in it
    async fn delete_repository(&self, name: &str) -> Result<(), RegistryError>;
}

/// ECR client backed by the AWS CLI
pub struct EcrClient {
    target: TargetRegistryConfig,
    runner: CommandRunner,
}

impl EcrClient {
    pub fn new(target: TargetRegistryConfig, runner: CommandRunner) -> Self {
        Self { target, runner }
    }

    async fn aws(&self, args: &[&str]) -> Result<String, CommandError> {
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 4);
        full.push("ecr");
        full.extend_from_slice(args);
        full.extend_from_slice(&["--region", self.target.region.as_str(), "--output", "json"]);
        Ok(self.runner.run(tools::AWS, &full).await?.stdout)
    }

    async fn login_password(&self) -> Result<String, CommandError> {
        let output = self
            .runner
            .run(
                tools::AWS,
                &["ecr", "get-login-password", "--region", self.target.region.as_str()],
            )
            .await?;
        let password = output.stdout.trim().to_string();
        if password.is_empty() {
            return Err(CommandError::InvalidOutput {
                command: "aws ecr get-login-password".to_string(),
                message: "empty password".to_string(),
            });
        }
        Ok(password)
    }
}

#[async_trait]
impl RegistryClient for EcrClient {
    fn host(&self) -> String {
        self.target.host()
    }

    async fn login(&self, kind: LoginKind) -> Result<(), LoginError> {
        let password = self
            .login_password()
            .await
            .map_err(|source| LoginError::PasswordUnavailable { source })?;

        let host = self.host();
        let result = match kind {
            LoginKind::Docker => {
                self.runner
                    .run_with_input(
                        tools::DOCKER,
                        &["login", "--username", "AWS", "--password-stdin", host.as_str()],
                        &password,
                    )
                    .await
            }
            LoginKind::Helm => {
                self.runner
                    .run_with_input(
                        tools::HELM,
                        &[
                            "registry",
                            "login",
                            "--username",
                            "AWS",
                            "--password-stdin",
                            host.as_str(),
                        ],
                        &password,
                    )
                    .await
            }
        };

        result.map_err(|source| LoginError::Rejected {
            kind,
            registry: host.clone(),
            source,
        })?;
        info!("Logged into {} with {}", host, kind);
        Ok(())
    }

    async fn repository_exists(&self, name: &str) -> Result<bool, RegistryError> {
        match self
            .aws(&["describe-repositories", "--repository-names", name])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.stderr_contains(REPOSITORY_NOT_FOUND) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_repository(&self, name: &str) -> Result<(), RegistryError> {
        match self
            .aws(&[
                "create-repository",
                "--repository-name",
                name,
                "--image-scanning-configuration",
                "scanOnPush=true",
            ])
            .await
        {
            Ok(_) => {
                info!("Created repository {}", name);
                Ok(())
            }
            Err(e) if e.stderr_contains(REPOSITORY_ALREADY_EXISTS) => {
                Err(RegistryError::AlreadyExists {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn image_exists(&self, name: &str, tag: &str) -> Result<bool, RegistryError> {
        let image_id = format!("imageTag={}", tag);
        match self
            .aws(&[
                "batch-get-image",
                "--repository-name",
                name,
                "--image-ids",
                image_id.as_str(),
            ])
            .await
        {
            Ok(stdout) => parse_batch_get_image(&stdout),
            Err(e) if e.stderr_contains(REPOSITORY_NOT_FOUND) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError> {
        // The CLI follows nextToken itself
        let stdout = self.aws(&["describe-repositories"]).await?;
        parse_repository_names(&stdout)
    }

    async fn delete_repository(&self, name: &str) -> Result<(), RegistryError> {
        match self
            .aws(&["delete-repository", "--repository-name", name, "--force"])
            .await
        {
            Ok(_) => {
                debug!("Deleted repository {}", name);
                Ok(())
            }
            Err(e) if e.stderr_contains(REPOSITORY_NOT_FOUND) => {
                Err(RegistryError::RepositoryNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRepositories {
    #[serde(default)]
    repositories: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    repository_name: String,
}

#[derive(Debug, Deserialize)]
struct BatchGetImage {
    #[serde(default)]
    images: Vec<serde_json::Value>,
    #[serde(default)]
    failures: Vec<ImageFailure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageFailure {
    failure_code: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

fn parse_repository_names(stdout: &str) -> Result<Vec<String>, RegistryError> {
    let response: DescribeRepositories =
        serde_json::from_str(stdout).map_err(|e| RegistryError::UnexpectedResponse {
            operation: "describe-repositories".to_string(),
            message: e.to_string(),
        })?;
    Ok(response
        .repositories
        .into_iter()
        .map(|r| r.repository_name)
        .collect())
}

/// `batch-get-image` succeeds even when the tag is missing and reports it
/// under `failures` instead
fn parse_batch_get_image(stdout: &str) -> Result<bool, RegistryError> {
    let unexpected = |message: String| RegistryError::UnexpectedResponse {
        operation: "batch-get-image".to_string(),
        message,
    };

    let response: BatchGetImage =
        serde_json::from_str(stdout).map_err(|e| unexpected(e.to_string()))?;
    if !response.images.is_empty() {
        return Ok(true);
    }
    match response
        .failures
        .iter()
        .find(|f| f.failure_code != IMAGE_NOT_FOUND)
    {
        Some(failure) => Err(unexpected(format!(
            "{}: {}",
            failure.failure_code,
            failure.failure_reason.as_deref().unwrap_or("no reason given")
        ))),
        None => Ok(false),
    }
}
