//! Source repository credentials
//!
//! Credentials live in a Secrets Manager secret holding a JSON object with
//! `username` and `password`, optionally nested under a sub-key when one
//! secret serves several repositories.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::config::SecretReference;
use crate::error::ConfigError;
use crate::infrastructure::command::{CommandRunner, MASK};
use crate::tools::tools;

const USERNAME: &str = "username";
const PASSWORD: &str = "password";

/// Username/password pair for a source registry
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &MASK)
            .finish()
    }
}

/// Looks up credentials by secret reference
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when the secret carries no username/password pair. A secret
    /// that cannot be read is a configuration error.
    async fn fetch(&self, secret: &SecretReference) -> Result<Option<Credentials>, ConfigError>;
}

/// Resolve optional credentials: no configured secret means no credentials
pub async fn resolve_credentials(
    store: &dyn CredentialStore,
    secret: Option<&SecretReference>,
) -> Result<Option<Credentials>, ConfigError> {
    match secret {
        Some(secret) => store.fetch(secret).await,
        None => Ok(None),
    }
}

/// Secrets Manager via the AWS CLI
pub struct SecretsManagerStore {
    runner: CommandRunner,
    region: String,
}

impl SecretsManagerStore {
    pub fn new(runner: CommandRunner, region: impl Into<String>) -> Self {
        Self {
            runner,
            region: region.into(),
        }
    }
}

#[async_trait]
impl CredentialStore for SecretsManagerStore {
    async fn fetch(&self, secret: &SecretReference) -> Result<Option<Credentials>, ConfigError> {
        debug!("Fetching credentials from secret {}", secret.name);
        let output = self
            .runner
            .run(
                tools::AWS,
                &[
                    "secretsmanager",
                    "get-secret-value",
                    "--secret-id",
                    secret.name.as_str(),
                    "--query",
                    "SecretString",
                    "--output",
                    "text",
                    "--region",
                    self.region.as_str(),
                ],
            )
            .await
            .map_err(|e| ConfigError::SecretUnavailable {
                secret: secret.name.clone(),
                message: e.to_string(),
            })?;

        parse_secret(secret, output.stdout.trim())
    }
}

/// Extract the credential pair from a secret string
pub fn parse_secret(
    secret: &SecretReference,
    secret_string: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let document: Value =
        serde_json::from_str(secret_string).map_err(|e| ConfigError::SecretUnavailable {
            secret: secret.name.clone(),
            message: format!("secret is not a JSON object: {}", e),
        })?;

    let entry = match &secret.key {
        Some(key) => document
            .get(key)
            .ok_or_else(|| ConfigError::SecretKeyMissing {
                secret: secret.name.clone(),
                key: key.clone(),
            })?,
        None => &document,
    };

    let field = |name: &str| entry.get(name).and_then(Value::as_str).map(str::to_string);
    Ok(match (field(USERNAME), field(PASSWORD)) {
        (Some(username), Some(password)) => Some(Credentials { username, password }),
        _ => None,
    })
}
