//! Target registry and credential settings

use crate::error::ConfigError;

/// Partition whose registries live under `amazonaws.com`
pub const DEFAULT_PARTITION: &str = "aws";

/// Private registry the mirror writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRegistryConfig {
    pub account_id: String,
    pub region: String,
    /// Cloud partition (`aws`, `aws-cn`, ...)
    pub partition: String,
}

impl TargetRegistryConfig {
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            partition: partition.into(),
        }
    }

    /// Build from optional parts, naming the first one that is missing
    pub fn from_parts(
        account_id: Option<String>,
        region: Option<String>,
        partition: Option<String>,
    ) -> Result<Self, ConfigError> {
        let account_id = required(account_id, "AWS_ACCOUNT_ID")?;
        let region = required(region, "AWS_DEFAULT_REGION")?;
        let partition = partition
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PARTITION.to_string());
        Ok(Self::new(account_id, region, partition))
    }

    /// Registry DNS suffix for the partition
    pub fn domain(&self) -> &'static str {
        if self.partition == DEFAULT_PARTITION {
            "amazonaws.com"
        } else {
            "amazonaws.com.cn"
        }
    }

    /// `<account>.dkr.ecr.<region>.<domain>`
    pub fn host(&self) -> String {
        format!(
            "{}.dkr.ecr.{}.{}",
            self.account_id,
            self.region,
            self.domain()
        )
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            field: field.to_string(),
        })
}

/// Where source repository credentials are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    pub name: String,
    /// Sub-key when the secret holds several credential pairs
    pub key: Option<String>,
}

impl SecretReference {
    /// `None` when no secret name is configured
    pub fn from_parts(name: Option<String>, key: Option<String>) -> Option<Self> {
        name.filter(|n| !n.is_empty()).map(|name| Self {
            name,
            key: key.filter(|k| !k.is_empty()),
        })
    }
}
