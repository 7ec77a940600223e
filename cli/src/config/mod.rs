//! # Mirror Configuration
//!
//! Inputs come from three places:
//!
//! 1. **Version manifests** (`<versions-dir>/default.yaml` + `<eks-version>.yaml`)
//!    - Workloads, chart coordinates and image locators
//!    - Additional images and source registry mappings
//!
//! 2. **Environment / CLI flags**
//!    - Target account, region and partition
//!    - Secret holding source repository credentials
//!
//! 3. **Result artifacts** (`replication-result.json`, `updated_images.json`)
//!    - Written by `resolve`, read back by the replicate commands

mod manifest;
mod target;

pub use manifest::load_version_manifest;
pub use target::{SecretReference, TargetRegistryConfig};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

use crate::error::ConfigError;

/// Chart replication input and resolve output
pub const REPLICATION_RESULT_FILE: &str = "replication-result.json";

/// Image replication input and resolve output
pub const UPDATED_IMAGES_FILE: &str = "updated_images.json";

/// Read a JSON artifact produced by an earlier run
pub fn read_json_input<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            ConfigError::Unreadable {
                path: path.display().to_string(),
                source,
            }
        }
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Write a pretty-printed JSON artifact
pub fn write_json_output<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    std::fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))
}
