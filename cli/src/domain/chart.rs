//! Chart metadata and chart replication types

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::workload::LocatorSource;
use crate::error::ResolutionError;

/// Introspected chart: Chart.yaml fields, default values and subcharts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartMetadata {
    pub chart: Value,
    pub values: Value,
    pub subcharts: BTreeMap<String, ChartMetadata>,
}

impl ChartMetadata {
    pub fn new(chart: Value, values: Value) -> Self {
        Self {
            chart,
            values,
            subcharts: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_subchart(mut self, name: impl Into<String>, metadata: ChartMetadata) -> Self {
        self.subcharts.insert(name.into(), metadata);
        self
    }

    /// True when nothing was fetched (workloads without images)
    pub fn is_empty(&self) -> bool {
        self.chart.is_null() && self.values.is_null() && self.subcharts.is_empty()
    }

    /// Metadata a locator scoped to `subchart` is evaluated against
    pub fn scope(&self, subchart: Option<&str>) -> Result<&ChartMetadata, ResolutionError> {
        match subchart {
            None => Ok(self),
            Some(name) => self
                .subcharts
                .get(name)
                .ok_or_else(|| ResolutionError::UnknownSubchart {
                    subchart: name.to_string(),
                }),
        }
    }

    pub fn tree(&self, location: LocatorSource) -> &Value {
        match location {
            LocatorSource::Values => &self.values,
            LocatorSource::Chart => &self.chart,
        }
    }
}

/// Chart coordinates written to the result document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmCoordinates {
    pub name: String,
    pub version: String,
    /// Mirror location, `oci://<prefix><repo-suffix>/<name>`
    pub repository: String,
    pub src_repository: String,
}

/// Per-workload entry of `replication-result.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartValues {
    pub helm: HelmCoordinates,

    /// Overlay holding only the rewritten paths
    #[serde(default = "empty_mapping")]
    pub values: Value,
}

fn empty_mapping() -> Value {
    Value::Mapping(Default::default())
}

/// One chart to mirror
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartTask {
    /// Workload key, also the local Helm repository alias
    pub workload: String,
    pub name: String,
    pub version: String,
    pub src_repository: String,
    pub target_repository: String,
}

impl ChartTask {
    pub fn from_chart_values(workload: impl Into<String>, chart: &ChartValues) -> Self {
        Self {
            workload: workload.into(),
            name: chart.helm.name.clone(),
            version: chart.helm.version.clone(),
            src_repository: chart.helm.src_repository.clone(),
            target_repository: chart.helm.repository.clone(),
        }
    }

    /// Target repository with the `oci://<host>/` prefix removed
    pub fn target_repository_name(&self) -> &str {
        let stripped = strip_oci(&self.target_repository);
        stripped.split_once('/').map_or(stripped, |(_, name)| name)
    }

    /// Tag Helm gives the pushed chart. OCI tags cannot carry `+`.
    pub fn target_tag(&self) -> String {
        self.version.replace('+', "_")
    }

    /// `helm push` destination: Helm appends the chart name itself
    pub fn push_target(&self) -> &str {
        self.target_repository
            .strip_suffix(&format!("/{}", self.name))
            .unwrap_or(&self.target_repository)
    }

    pub fn is_oci_source(&self) -> bool {
        self.src_repository.starts_with("oci://")
    }

    /// Reference for `helm pull`: OCI sources are pulled directly, classic
    /// repositories through the alias registered for the workload
    pub fn pull_reference(&self) -> String {
        if self.is_oci_source() {
            format!("{}/{}", self.src_repository.trim_end_matches('/'), self.name)
        } else {
            format!("{}/{}", self.workload, self.name)
        }
    }

    /// Source registry host, for OCI sources
    pub fn source_registry(&self) -> Option<&str> {
        if !self.is_oci_source() {
            return None;
        }
        let stripped = strip_oci(&self.src_repository);
        Some(stripped.split('/').next().unwrap_or(stripped))
    }
}

impl fmt::Display for ChartTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}", self.name, self.version, self.target_repository)
    }
}

fn strip_oci(repository: &str) -> &str {
    repository.strip_prefix("oci://").unwrap_or(repository)
}
