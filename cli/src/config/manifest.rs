//! Version manifest loading
//!
//! `<versions-dir>/default.yaml` holds settings shared by every release
//! train; `<versions-dir>/<eks-version>.yaml` overrides it key by key.

use serde_yaml::Value;
use std::path::Path;
use tracing::debug;

use crate::domain::values::deep_merge;
use crate::domain::VersionManifest;
use crate::error::ConfigError;

/// Shared defaults, optional
pub const DEFAULT_MANIFEST: &str = "default.yaml";

pub fn load_version_manifest(
    versions_dir: &Path,
    eks_version: &str,
) -> Result<VersionManifest, ConfigError> {
    let default_path = versions_dir.join(DEFAULT_MANIFEST);
    let version_path = versions_dir.join(format!("{}.yaml", eks_version));

    let mut merged = if default_path.exists() {
        debug!("Loading shared defaults from {}", default_path.display());
        read_yaml(&default_path)?
    } else {
        Value::Mapping(Default::default())
    };

    if !version_path.exists() {
        return Err(ConfigError::FileNotFound {
            path: version_path.display().to_string(),
        });
    }
    deep_merge(&mut merged, read_yaml(&version_path)?);

    serde_yaml::from_value(merged).map_err(|e| ConfigError::ParseError {
        path: version_path.display().to_string(),
        message: e.to_string(),
    })
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    // An empty file parses as null
    Ok(match value {
        Value::Null => Value::Mapping(Default::default()),
        other => other,
    })
}
