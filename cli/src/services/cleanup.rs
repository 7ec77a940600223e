//! Mirror teardown

use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::infrastructure::ecr::RegistryClient;

/// What a teardown removed and what it could not
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Delete every repository whose name starts with `prefix`, images included.
///
/// Repositories that vanish mid-run are ignored. Other failures are
/// collected so one stuck repository does not block the rest.
pub async fn delete_repositories(
    registry: &dyn RegistryClient,
    prefix: &str,
) -> Result<CleanupReport, RegistryError> {
    let repositories = registry.list_repositories().await?;
    let mut report = CleanupReport::default();

    for name in repositories.into_iter().filter(|name| name.starts_with(prefix)) {
        match registry.delete_repository(&name).await {
            Ok(()) => {
                info!("Deleted repository {}", name);
                report.deleted.push(name);
            }
            Err(RegistryError::RepositoryNotFound { .. }) => {
                debug!("{} already gone", name);
            }
            Err(e) => {
                warn!("Failed to delete repository {}: {}", name, e);
                report.failed.push((name, e.to_string()));
            }
        }
    }

    Ok(report)
}
