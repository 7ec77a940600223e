//! Container image operations via the docker CLI

use async_trait::async_trait;

use crate::error::CommandError;
use crate::infrastructure::command::CommandRunner;
use crate::infrastructure::secrets::Credentials;
use crate::tools::tools;

/// Local image transfer used by the image replication run
#[async_trait]
pub trait ImageTool: Send + Sync {
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<(), CommandError>;

    async fn pull(&self, image: &str) -> Result<(), CommandError>;

    async fn tag(&self, source: &str, target: &str) -> Result<(), CommandError>;

    async fn push(&self, image: &str) -> Result<(), CommandError>;

    /// Drop a local image to bound disk use over long batches
    async fn remove(&self, image: &str) -> Result<(), CommandError>;
}

/// Docker CLI client
pub struct DockerClient {
    runner: CommandRunner,
}

impl DockerClient {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ImageTool for DockerClient {
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<(), CommandError> {
        self.runner
            .run_with_input(
                tools::DOCKER,
                &[
                    "login",
                    "--username",
                    credentials.username.as_str(),
                    "--password-stdin",
                    registry,
                ],
                &credentials.password,
            )
            .await?;
        Ok(())
    }

    async fn pull(&self, image: &str) -> Result<(), CommandError> {
        self.runner.run(tools::DOCKER, &["pull", image]).await?;
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), CommandError> {
        self.runner
            .run(tools::DOCKER, &["tag", source, target])
            .await?;
        Ok(())
    }

    async fn push(&self, image: &str) -> Result<(), CommandError> {
        self.runner.run(tools::DOCKER, &["push", image]).await?;
        Ok(())
    }

    async fn remove(&self, image: &str) -> Result<(), CommandError> {
        self.runner.run(tools::DOCKER, &["rmi", image]).await?;
        Ok(())
    }
}
