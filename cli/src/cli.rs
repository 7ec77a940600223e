//! CLI definitions for artifact-mirror
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{SecretReference, TargetRegistryConfig};
use crate::error::ConfigError;

#[derive(Parser)]
#[command(
    name = "artifact-mirror",
    version,
    about = "Mirror cluster add-on images and Helm charts into a private registry",
    long_about = "Resolves the images every add-on chart pulls, rewrites them to point at a private ECR mirror,\nand replicates images and OCI charts idempotently."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve chart images and write the rewritten values and image worklist
    Resolve {
        /// Kubernetes version selecting the version manifest
        #[arg(short, long)]
        eks_version: String,

        /// Directory holding default.yaml and <eks-version>.yaml
        #[arg(short = 'd', long)]
        versions_directory: PathBuf,

        /// Mirror prefix, e.g. 123456789012.dkr.ecr.us-east-1.amazonaws.com/
        #[arg(short = 'p', long)]
        registry_prefix: String,

        /// Register and refresh the chart repositories before introspection
        #[arg(short, long)]
        update_helm_repos: bool,

        /// Where replication-result.json and updated_images.json are written
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        secret: SecretArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Replicate the image worklist into the mirror
    ReplicateImages {
        /// Image worklist written by `resolve`
        #[arg(long, default_value = "updated_images.json")]
        input: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        secret: SecretArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Replicate the rewritten charts into the mirror as OCI artifacts
    ReplicateCharts {
        /// Replication result written by `resolve`
        #[arg(long, default_value = "replication-result.json")]
        input: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        secret: SecretArgs,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Delete mirrored repositories, images included
    DeleteRepos {
        /// Repository name prefix to delete
        #[arg(long)]
        prefix: String,

        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Replication batch tuning
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Artifacts transferred at once
    #[arg(long, default_value = "1")]
    pub workers: usize,

    /// Time limit for every external command (e.g. 90s, 10m)
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    pub command_timeout: Duration,
}

/// Target registry account settings
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Target AWS account
    #[arg(long, env = "AWS_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// Target AWS region
    #[arg(long, env = "AWS_DEFAULT_REGION")]
    pub region: Option<String>,

    /// AWS partition (aws, aws-cn)
    #[arg(long, env = "AWS_PARTITION")]
    pub partition: Option<String>,
}

impl TargetArgs {
    pub fn into_config(self) -> Result<TargetRegistryConfig, ConfigError> {
        TargetRegistryConfig::from_parts(self.account_id, self.region, self.partition)
    }
}

/// Secret holding source repository credentials
#[derive(Args, Debug, Clone)]
pub struct SecretArgs {
    /// Secrets Manager secret with username/password for source repositories
    #[arg(long, env = "SEEDFARMER_PARAMETER_HELM_REPO_SECRET_NAME")]
    pub helm_repo_secret_name: Option<String>,

    /// Key inside the secret holding the credentials object
    #[arg(long, env = "SEEDFARMER_PARAMETER_HELM_REPO_SECRET_KEY")]
    pub helm_repo_secret_key: Option<String>,
}

impl SecretArgs {
    pub fn reference(&self) -> Option<SecretReference> {
        SecretReference::from_parts(
            self.helm_repo_secret_name.clone(),
            self.helm_repo_secret_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_replicate_images() {
        let cli = Cli::try_parse_from([
            "artifact-mirror",
            "-v",
            "replicate-images",
            "--workers",
            "4",
            "--command-timeout",
            "90s",
            "--account-id",
            "123",
            "--region",
            "us-east-1",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::ReplicateImages {
                input,
                batch,
                target,
                ..
            } => {
                assert_eq!(input, PathBuf::from("updated_images.json"));
                assert_eq!(batch.workers, 4);
                assert_eq!(batch.command_timeout, Duration::from_secs(90));
                let config = target.into_config().unwrap();
                assert_eq!(config.host(), "123.dkr.ecr.us-east-1.amazonaws.com");
            }
            _ => panic!("expected replicate-images"),
        }
    }

    #[test]
    fn test_parse_resolve_short_flags() {
        let cli = Cli::try_parse_from([
            "artifact-mirror",
            "resolve",
            "-e",
            "1.29",
            "-d",
            "versions",
            "-p",
            "123.dkr.ecr.us-east-1.amazonaws.com/",
            "-u",
        ])
        .unwrap();

        match cli.command {
            Commands::Resolve {
                eks_version,
                versions_directory,
                update_helm_repos,
                output_dir,
                ..
            } => {
                assert_eq!(eks_version, "1.29");
                assert_eq!(versions_directory, PathBuf::from("versions"));
                assert!(update_helm_repos);
                assert_eq!(output_dir, PathBuf::from("."));
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_default_timeout() {
        let cli = Cli::try_parse_from(["artifact-mirror", "replicate-charts"]).unwrap();
        match cli.command {
            Commands::ReplicateCharts { batch, .. } => {
                assert_eq!(batch.command_timeout, Duration::from_secs(600));
                assert_eq!(batch.workers, 1);
            }
            _ => panic!("expected replicate-charts"),
        }
    }
}
