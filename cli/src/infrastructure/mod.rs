//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Target registry (ECR via the AWS CLI)
//! - Helm (chart introspection and OCI chart transfer)
//! - Docker (image transfer)
//! - Secrets Manager (source repository credentials)

pub mod command;
pub mod docker;
pub mod ecr;
pub mod helm;
pub mod secrets;

#[cfg(test)]
pub mod fake;

// Re-export commonly used types
pub use command::CommandRunner;
pub use docker::DockerClient;
pub use ecr::{EcrClient, RegistryClient};
pub use helm::HelmClient;
pub use secrets::{resolve_credentials, Credentials, SecretsManagerStore};
