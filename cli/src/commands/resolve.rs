use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cli::{SecretArgs, TargetArgs};
use crate::config::{
    load_version_manifest, write_json_output, REPLICATION_RESULT_FILE, UPDATED_IMAGES_FILE,
};
use crate::domain::{ReplicationResult, ReplicationTask, VersionManifest};
use crate::infrastructure::{CommandRunner, HelmClient};
use crate::services::{ReferenceRewriter, WorkloadResolver};
use crate::tools::{ensure_available, tools};
use crate::ui;

/// Resolve, rewrite and write both result artifacts
pub async fn execute(
    eks_version: String,
    versions_directory: PathBuf,
    registry_prefix: String,
    update_helm_repos: bool,
    output_dir: PathBuf,
    secret: SecretArgs,
    target: TargetArgs,
) -> Result<()> {
    ui::print_header(&format!("Resolving add-on artifacts for {}", eks_version));

    let manifest = load_version_manifest(&versions_directory, &eks_version)?;
    info!(
        "Loaded {} workloads and {} additional images",
        manifest.charts.len(),
        manifest.additional_images.len()
    );

    ensure_available(tools::HELM)?;
    let runner = CommandRunner::new();
    let resolver = WorkloadResolver::new(Arc::new(HelmClient::new(runner.clone())));

    if update_helm_repos {
        if secret.reference().is_some() {
            ensure_available(tools::AWS)?;
        }
        let credentials =
            super::source_credentials(&secret, target.region.as_deref(), &runner).await?;
        resolver
            .update_repositories(&manifest.charts, credentials.as_ref())
            .await;
    }

    let rewriter = ReferenceRewriter::new(registry_prefix);
    let (result, tasks) = resolve_manifest(&resolver, &rewriter, manifest).await?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    write_json_output(&output_dir.join(REPLICATION_RESULT_FILE), &result)?;
    write_json_output(&output_dir.join(UPDATED_IMAGES_FILE), &tasks)?;

    ui::print_success(&format!(
        "Resolved {} charts and {} images into {}",
        result.charts.len(),
        tasks.len(),
        output_dir.display()
    ));
    Ok(())
}

/// Introspect every workload and build the result document and image worklist
pub async fn resolve_manifest(
    resolver: &WorkloadResolver,
    rewriter: &ReferenceRewriter,
    manifest: VersionManifest,
) -> Result<(ReplicationResult, Vec<ReplicationTask>)> {
    let metadata = resolver.fetch_chart_info(&manifest.charts).await?;
    let rewritten = rewriter.apply_chart_info(&manifest.charts, &metadata);

    let tasks = rewriter.image_tasks(
        &manifest.additional_images,
        &rewritten.images,
        &manifest.docker_mappings,
    );
    let result = ReplicationResult {
        ami: manifest.ami,
        charts: rewritten.charts,
        additional_images: rewriter.additional_images(&manifest.additional_images),
    };
    Ok((result, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::read_json_input;
    use crate::infrastructure::fake::{FakeChartInfo, FAKE_HOST};

    const VERSION: &str = r#"
ami:
  version: 1.29.0-20240213
additional_images:
  kubectl: bitnami/kubectl:1.29
docker_mappings:
  docker.io: mirror.example.com/dockerhub
  default: mirror.example.com/dockerhub
charts:
  cert_manager:
    name: cert-manager
    version: v1.14.4
    repository: https://charts.jetstack.io
    images:
      cert_manager:
        repository:
          path: image.repository
        tag:
          location: chart
          path: appVersion
"#;

    #[tokio::test]
    async fn test_resolve_manifest_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.29.yaml"), VERSION).unwrap();
        let manifest = load_version_manifest(dir.path(), "1.29").unwrap();

        let provider = FakeChartInfo::new().with_chart(
            "cert_manager/cert-manager",
            "name: cert-manager\nappVersion: v1.14.4\n",
            "image:\n  repository: quay.io/jetstack/cert-manager-controller\n",
        );
        let resolver = WorkloadResolver::new(Arc::new(provider));
        let rewriter = ReferenceRewriter::new(format!("{}/", FAKE_HOST));

        let (result, tasks) = resolve_manifest(&resolver, &rewriter, manifest)
            .await
            .unwrap();

        assert_eq!(
            result.ami.as_ref().and_then(|ami| ami.version.as_deref()),
            Some("1.29.0-20240213")
        );
        assert_eq!(
            result.additional_images["kubectl"],
            format!("{}/bitnami/kubectl:1.29", FAKE_HOST)
        );

        let cert_manager = &result.charts["cert_manager"];
        assert_eq!(
            cert_manager.values["image"]["repository"].as_str(),
            Some(format!("{}/quay.io/jetstack/cert-manager-controller", FAKE_HOST).as_str())
        );
        // Dropped by the cert_manager fixup
        assert!(cert_manager.values.get("appVersion").is_none());

        assert_eq!(
            tasks,
            vec![
                ReplicationTask::new(
                    "mirror.example.com/dockerhub/bitnami/kubectl:1.29",
                    format!("{}/bitnami/kubectl:1.29", FAKE_HOST),
                ),
                ReplicationTask::new(
                    "quay.io/jetstack/cert-manager-controller:v1.14.4",
                    format!("{}/quay.io/jetstack/cert-manager-controller:v1.14.4", FAKE_HOST),
                ),
            ]
        );

        // Both artifacts survive a write/read cycle
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        write_json_output(&out.join(UPDATED_IMAGES_FILE), &tasks).unwrap();
        let back: Vec<ReplicationTask> = read_json_input(&out.join(UPDATED_IMAGES_FILE)).unwrap();
        assert_eq!(back, tasks);
    }
}
