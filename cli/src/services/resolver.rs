//! Workload resolver - fetches chart metadata for every workload
//!
//! Registers each workload's chart repository with Helm (optional), then
//! introspects the chart, its default values and any declared subcharts.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ChartMetadata, WorkloadSpec};
use crate::infrastructure::helm::{ChartInfoProvider, ShowKind};
use crate::infrastructure::secrets::Credentials;

/// Service for resolving workload chart metadata
pub struct WorkloadResolver {
    provider: Arc<dyn ChartInfoProvider>,
}

impl WorkloadResolver {
    pub fn new(provider: Arc<dyn ChartInfoProvider>) -> Self {
        Self { provider }
    }

    /// Register every workload's repository under its workload key, then
    /// refresh the local index once. Failures are logged and skipped.
    ///
    /// Returns the number of repositories registered.
    pub async fn update_repositories(
        &self,
        workloads: &BTreeMap<String, WorkloadSpec>,
        credentials: Option<&Credentials>,
    ) -> usize {
        let mut registered = 0;
        for (alias, workload) in workloads {
            if workload.is_oci() {
                debug!("{} is served over OCI, no repository to add", alias);
                continue;
            }
            match self
                .provider
                .add_repo(alias, &workload.repository, credentials)
                .await
            {
                Ok(()) => registered += 1,
                Err(e) => warn!("Failed to add repository {} for {}: {}", workload.repository, alias, e),
            }
        }

        if let Err(e) = self.provider.update_repos().await {
            warn!("Failed to update Helm repositories: {}", e);
        }
        info!("Registered {} chart repositories", registered);
        registered
    }

    /// Introspect every workload that declares images.
    ///
    /// A failing `show` aborts the run. A failing subchart only logs a
    /// warning and leaves an empty entry for it.
    pub async fn fetch_chart_info(
        &self,
        workloads: &BTreeMap<String, WorkloadSpec>,
    ) -> Result<BTreeMap<String, ChartMetadata>> {
        let mut charts = BTreeMap::new();

        for (alias, workload) in workloads {
            if !workload.has_images() {
                debug!("{} declares no images", alias);
                charts.insert(alias.clone(), ChartMetadata::default());
                continue;
            }

            let chart_ref = workload.chart_ref(alias);
            info!("Fetching chart info for {} ({} {})", alias, chart_ref, workload.version);

            let chart = self
                .provider
                .show(ShowKind::Chart, &chart_ref, &workload.version)
                .await
                .with_context(|| format!("Failed to read Chart.yaml of {}", alias))?;
            let values = self
                .provider
                .show(ShowKind::Values, &chart_ref, &workload.version)
                .await
                .with_context(|| format!("Failed to read default values of {}", alias))?;

            let mut metadata = ChartMetadata::new(chart, values);
            for subchart in &workload.subcharts {
                let sub = match self
                    .provider
                    .show_subchart(&chart_ref, subchart, &workload.version)
                    .await
                {
                    Ok(sub) => sub,
                    Err(e) => {
                        warn!("Subchart {} of {} unavailable: {}", subchart, alias, e);
                        ChartMetadata::default()
                    }
                };
                metadata.subcharts.insert(subchart.clone(), sub);
            }

            charts.insert(alias.clone(), metadata);
        }

        Ok(charts)
    }
}
