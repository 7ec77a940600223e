//! Workload manifest types
//!
//! A version manifest lists every cluster add-on (workload) shipped with a
//! release train, the chart that installs it, and where each of the chart's
//! container images is declared inside its values.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::values::ValuePath;
use crate::error::ResolutionError;

/// Per-version manifest, after layering `default.yaml` under `<version>.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ami: Option<AmiSpec>,

    /// Standalone images not sourced from chart values
    #[serde(default)]
    pub additional_images: BTreeMap<String, String>,

    /// Source registry host (or `default`) to pull-through mirror
    #[serde(default)]
    pub docker_mappings: BTreeMap<String, String>,

    /// Workloads keyed by name; the key doubles as the local Helm repo alias
    #[serde(default)]
    pub charts: BTreeMap<String, WorkloadSpec>,
}

/// Node AMI release, passed through to the result document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmiSpec {
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub version: Option<String>,
}

/// One cluster add-on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Chart name
    pub name: String,

    #[serde(deserialize_with = "scalar_string")]
    pub version: String,

    /// Chart repository URL (`https://...` or `oci://...`)
    pub repository: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcharts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<BTreeMap<String, ImageLocators>>,
}

impl WorkloadSpec {
    pub fn has_images(&self) -> bool {
        self.images.as_ref().is_some_and(|images| !images.is_empty())
    }

    pub fn is_oci(&self) -> bool {
        self.repository.starts_with("oci://")
    }

    /// Last path segment of the repository URL
    pub fn repository_suffix(&self) -> &str {
        let trimmed = self.repository.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Chart reference usable with `helm show`/`helm pull`
    pub fn chart_ref(&self, alias: &str) -> String {
        if self.is_oci() {
            format!("{}/{}", self.repository.trim_end_matches('/'), self.name)
        } else {
            format!("{}/{}", alias, self.name)
        }
    }
}

/// Where an image's parts live inside a chart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageLocators {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<ImageLocator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<ImageLocator>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<ImageLocator>,

    /// Fields blanked in the overlay, e.g. digests that would pin the
    /// upstream image
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub remove: Vec<ImageLocator>,
}

/// Which document a locator path is evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorSource {
    #[default]
    Values,
    Chart,
}

/// A declared path into chart metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageLocator {
    #[serde(default)]
    pub location: LocatorSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Evaluate against this subchart instead of the parent chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subchart: Option<String>,

    /// Literal value used verbatim instead of resolving `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
impl ImageLocator {
    pub fn values(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn in_subchart(mut self, subchart: impl Into<String>) -> Self {
        self.subchart = Some(subchart.into());
        self
    }
}

impl ImageLocator {
    /// Parsed path, as read from the chart
    pub fn value_path(&self, role: LocatorRole) -> Result<ValuePath, ResolutionError> {
        let raw = self.path.as_deref().ok_or_else(|| ResolutionError::MissingPath {
            role: role.to_string(),
        })?;
        ValuePath::parse(raw)
    }

    /// Path written in the overlay. Helm nests subchart values under the
    /// subchart's name.
    pub fn overlay_path(&self, role: LocatorRole) -> Result<ValuePath, ResolutionError> {
        let path = self.value_path(role)?;
        Ok(match &self.subchart {
            Some(subchart) => path.nested_under(subchart),
            None => path,
        })
    }
}

/// What a locator points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorRole {
    Registry,
    Repository,
    Tag,
    Remove,
}

impl fmt::Display for LocatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registry => "registry",
            Self::Repository => "repository",
            Self::Tag => "tag",
            Self::Remove => "remove",
        })
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ImageLocator>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(ImageLocator),
        Many(Vec<ImageLocator>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(locator) => vec![locator],
        OneOrMany::Many(locators) => locators,
    })
}

/// Versions are often written unquoted (`version: 1.10`), so accept any scalar
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    crate::domain::values::scalar_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(crate::domain::values::scalar_to_string(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
ami:
  version: 1.29.0-20240213
additional_images:
  kubectl: bitnami/kubectl:1.29
docker_mappings:
  docker.io: mirror.internal/dh
charts:
  cert_manager:
    name: cert-manager
    version: v1.14.4
    repository: https://charts.jetstack.io
    images:
      cert_manager:
        repository:
          location: values
          path: image.repository
        tag:
          location: chart
          path: appVersion
  kyverno:
    name: kyverno
    version: 3.1
    repository: https://kyverno.github.io/kyverno/
    subcharts:
      - crds
    images:
      background:
        registry:
          path: admissionController.container.image.registry
        repository:
          path: admissionController.container.image.repository
        remove:
          path: admissionController.container.image.digest
      crds_kubectl:
        repository:
          name: bitnami/kubectl
        tag:
          subchart: crds
          path: image.tag
        remove:
          - path: image.digest
            subchart: crds
          - path: image.pullPolicy
            subchart: crds
  metrics_server:
    name: metrics-server
    version: 3.12.0
    repository: https://kubernetes-sigs.github.io/metrics-server/
"#;

    #[test]
    fn test_manifest_deserialization() {
        let manifest: VersionManifest = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(
            manifest.ami.and_then(|ami| ami.version).as_deref(),
            Some("1.29.0-20240213")
        );
        assert_eq!(manifest.charts.len(), 3);

        let kyverno = &manifest.charts["kyverno"];
        assert_eq!(kyverno.version, "3.1");
        assert_eq!(kyverno.subcharts, vec!["crds".to_string()]);

        let images = kyverno.images.as_ref().unwrap();
        assert_eq!(images["background"].remove.len(), 1);
        assert_eq!(images["crds_kubectl"].remove.len(), 2);
        assert_eq!(
            images["crds_kubectl"].repository.as_ref().unwrap().name.as_deref(),
            Some("bitnami/kubectl")
        );

        let cert_manager = &manifest.charts["cert_manager"];
        let tag = cert_manager.images.as_ref().unwrap()["cert_manager"]
            .tag
            .clone()
            .unwrap();
        assert_eq!(tag.location, LocatorSource::Chart);

        assert!(!manifest.charts["metrics_server"].has_images());
    }

    #[test]
    fn test_repository_suffix() {
        let manifest: VersionManifest = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.charts["kyverno"].repository_suffix(), "kyverno");
        assert_eq!(
            manifest.charts["cert_manager"].repository_suffix(),
            "charts.jetstack.io"
        );
    }

    #[test]
    fn test_chart_ref() {
        let manifest: VersionManifest = serde_yaml::from_str(MANIFEST).unwrap();
        assert_eq!(
            manifest.charts["cert_manager"].chart_ref("cert_manager"),
            "cert_manager/cert-manager"
        );

        let oci = WorkloadSpec {
            name: "karpenter".to_string(),
            version: "0.37.0".to_string(),
            repository: "oci://public.ecr.aws/karpenter/".to_string(),
            subcharts: Vec::new(),
            images: None,
        };
        assert_eq!(oci.chart_ref("karpenter"), "oci://public.ecr.aws/karpenter/karpenter");
    }

    #[test]
    fn test_overlay_path_nests_subchart() {
        let locator = ImageLocator::values("image.digest").in_subchart("crds");
        assert_eq!(
            locator.overlay_path(LocatorRole::Remove).unwrap().to_string(),
            "crds.image.digest"
        );
        assert_eq!(
            locator.value_path(LocatorRole::Remove).unwrap().to_string(),
            "image.digest"
        );
    }

    #[test]
    fn test_missing_path() {
        let locator = ImageLocator {
            name: Some("bitnami/kubectl".to_string()),
            ..ImageLocator::default()
        };
        assert_eq!(
            locator.value_path(LocatorRole::Repository),
            Err(ResolutionError::MissingPath {
                role: "repository".to_string()
            })
        );
    }
}
