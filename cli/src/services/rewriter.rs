//! Reference rewriter - points every chart image at the mirror
//!
//! For each workload the rewriter evaluates the declared image locators
//! against the introspected chart, and records every rewritten field in a
//! values overlay at the same structural location. The overlay is merged over
//! the chart defaults at install time, so the deployed chart only ever pulls
//! from the mirror.
//!
//! Rules per image:
//! 1. `registry` resolved: overlay gets `prefix + registry`
//! 2. `repository`: a literal `name` is used as-is and not written; a
//!    resolved value is written as `prefix + repository` only when no
//!    registry resolved (the prefix is never applied twice)
//! 3. `tag`: written back unchanged
//! 4. `remove`: written as `""`

use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::domain::image::{apply_image_mapping, ImageReference};
use crate::domain::values::{self, scalar_to_string};
use crate::domain::workload::{ImageLocator, ImageLocators, LocatorRole, LocatorSource};
use crate::domain::{ChartMetadata, ChartValues, HelmCoordinates, ReplicationTask, WorkloadSpec};
use crate::error::ResolutionError;

/// Named post-rewrite adjustment for one workload
pub struct ValueFixup {
    pub workload: &'static str,
    pub description: &'static str,
    pub apply: fn(&mut Value),
}

/// Workload-specific fixups applied to the finished overlay
pub const VALUE_FIXUPS: &[ValueFixup] = &[ValueFixup {
    workload: "cert_manager",
    description: "drop appVersion, cert-manager charts reject it in values",
    apply: drop_app_version,
}];

fn drop_app_version(overlay: &mut Value) {
    if let Some(map) = overlay.as_mapping_mut() {
        map.remove("appVersion");
    }
}

/// Overlays and chart images for a whole manifest
#[derive(Debug, Clone, Default)]
pub struct RewriteResult {
    pub charts: BTreeMap<String, ChartValues>,
    /// Resolved chart images in workload order
    pub images: Vec<String>,
}

/// Service for rewriting chart references to the mirror
pub struct ReferenceRewriter {
    registry_prefix: String,
}

impl ReferenceRewriter {
    /// `registry_prefix` is the mirror root, e.g.
    /// `123456789012.dkr.ecr.us-east-1.amazonaws.com/`
    pub fn new(registry_prefix: impl Into<String>) -> Self {
        Self {
            registry_prefix: registry_prefix.into(),
        }
    }

    fn prefixed(&self, value: &str) -> String {
        format!("{}{}", self.registry_prefix, value)
    }

    pub fn apply_chart_info(
        &self,
        workloads: &BTreeMap<String, WorkloadSpec>,
        metadata: &BTreeMap<String, ChartMetadata>,
    ) -> RewriteResult {
        let empty = ChartMetadata::default();
        let mut result = RewriteResult::default();

        for (workload, spec) in workloads {
            let chart = metadata.get(workload).unwrap_or(&empty);
            if chart.is_empty() && spec.has_images() {
                warn!("{}: no chart metadata, its images cannot resolve", workload);
            }
            let mut overlay = Value::Mapping(Mapping::new());

            for (image_name, locators) in spec.images.iter().flatten() {
                if let Some(image) = self.rewrite_image(chart, locators, &mut overlay) {
                    debug!("{}/{}: {}", workload, image_name, image);
                    result.images.push(image);
                } else {
                    warn!(
                        "{}/{}: repository did not resolve, image not mirrored",
                        workload, image_name
                    );
                }
            }

            for fixup in VALUE_FIXUPS.iter().filter(|f| f.workload == workload.as_str()) {
                debug!("{}: {}", workload, fixup.description);
                (fixup.apply)(&mut overlay);
            }

            let helm = HelmCoordinates {
                name: spec.name.clone(),
                version: spec.version.clone(),
                repository: format!(
                    "oci://{}{}/{}",
                    self.registry_prefix,
                    spec.repository_suffix(),
                    spec.name
                ),
                src_repository: spec.repository.clone(),
            };
            result.charts.insert(
                workload.clone(),
                ChartValues {
                    helm,
                    values: overlay,
                },
            );
        }

        info!(
            "Rewrote {} charts with {} images",
            result.charts.len(),
            result.images.len()
        );
        result
    }

    /// Write the overlay entries for one image and return its resolved
    /// `registry/repository:tag`, if the repository resolved
    fn rewrite_image(
        &self,
        chart: &ChartMetadata,
        locators: &ImageLocators,
        overlay: &mut Value,
    ) -> Option<String> {
        let registry = locators.registry.as_ref().and_then(|locator| {
            let registry = resolve_string(chart, locator, LocatorRole::Registry)?;
            write(overlay, locator, LocatorRole::Registry, self.prefixed(&registry).into());
            Some(registry)
        });

        let repository = locators.repository.as_ref().and_then(|locator| {
            if let Some(name) = &locator.name {
                return Some(name.clone());
            }
            let repository = resolve_string(chart, locator, LocatorRole::Repository)?;
            let rewritten = if registry.is_some() {
                repository.clone()
            } else {
                self.prefixed(&repository)
            };
            write(overlay, locator, LocatorRole::Repository, rewritten.into());
            Some(repository)
        });

        let tag = locators.tag.as_ref().and_then(|locator| {
            let tag = resolve(chart, locator, LocatorRole::Tag)?;
            write(overlay, locator, LocatorRole::Tag, tag.clone());
            scalar_to_string(&tag)
        });

        for locator in &locators.remove {
            write(overlay, locator, LocatorRole::Remove, Value::String(String::new()));
        }

        Some(ImageReference::new(registry, repository?, tag).image())
    }

    /// Mirrored reference for each additional image
    pub fn additional_images(
        &self,
        additional: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        additional
            .iter()
            .map(|(name, image)| (name.clone(), self.prefixed(image)))
            .collect()
    }

    /// Image worklist: additional images first, then chart images. The
    /// source goes through `mappings`, the target is the unmapped image under
    /// the mirror prefix. Duplicates keep their first position.
    pub fn image_tasks(
        &self,
        additional: &BTreeMap<String, String>,
        chart_images: &[String],
        mappings: &BTreeMap<String, String>,
    ) -> Vec<ReplicationTask> {
        let mut seen = HashSet::new();
        additional
            .values()
            .chain(chart_images)
            .map(|image| ReplicationTask::new(apply_image_mapping(image, mappings), self.prefixed(image)))
            .filter(|task| seen.insert(task.clone()))
            .collect()
    }
}

/// Evaluate a locator to the scalar it points at.
///
/// Subchart-scoped values locators first look for a parent-level override
/// under the subchart's key, as Helm would when rendering.
fn try_resolve(
    chart: &ChartMetadata,
    locator: &ImageLocator,
    role: LocatorRole,
) -> Result<Value, ResolutionError> {
    let path = locator.value_path(role)?;
    if let (Some(subchart), LocatorSource::Values) = (&locator.subchart, locator.location) {
        if let Ok(value) = values::scalar(&chart.values, &path.nested_under(subchart)) {
            return Ok(value.clone());
        }
    }
    let scope = chart.scope(locator.subchart.as_deref())?;
    values::scalar(scope.tree(locator.location), &path).cloned()
}

fn resolve(chart: &ChartMetadata, locator: &ImageLocator, role: LocatorRole) -> Option<Value> {
    try_resolve(chart, locator, role)
        .map_err(|e| debug!("Skipping {} locator: {}", role, e))
        .ok()
}

fn resolve_string(chart: &ChartMetadata, locator: &ImageLocator, role: LocatorRole) -> Option<String> {
    resolve(chart, locator, role)
        .as_ref()
        .and_then(scalar_to_string)
        .filter(|s| !s.is_empty())
}

fn write(overlay: &mut Value, locator: &ImageLocator, role: LocatorRole, value: Value) {
    match locator.overlay_path(role) {
        Ok(path) => values::set(overlay, &path, value),
        Err(e) => debug!("Not writing {} locator: {}", role, e),
    }
}
