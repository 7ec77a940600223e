//! Command drivers - wire production adapters into the services

pub mod delete_repos;
pub mod replicate_charts;
pub mod replicate_images;
pub mod resolve;

use anyhow::Result;

use crate::cli::SecretArgs;
use crate::error::ConfigError;
use crate::infrastructure::{resolve_credentials, CommandRunner, Credentials, SecretsManagerStore};

/// Fetch source repository credentials when a secret is configured.
///
/// The secret lives in the target region.
pub(crate) async fn source_credentials(
    secret: &SecretArgs,
    region: Option<&str>,
    runner: &CommandRunner,
) -> Result<Option<Credentials>> {
    let Some(reference) = secret.reference() else {
        return Ok(None);
    };
    let region = region.filter(|r| !r.is_empty()).ok_or_else(|| ConfigError::MissingField {
        field: "AWS_DEFAULT_REGION".to_string(),
    })?;

    let store = SecretsManagerStore::new(runner.clone(), region);
    Ok(resolve_credentials(&store, Some(&reference)).await?)
}
