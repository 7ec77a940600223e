//! Replication domain types
//!
//! Every artifact goes through the same small state machine:
//! CheckTarget -> EnsureRepository -> transfer steps -> Succeeded. A target
//! that already holds the artifact short-circuits to Skipped, and any failing
//! step ends the task as Failed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::chart::ChartValues;
use crate::domain::image::{split_tag, ImageReference, DEFAULT_TAG};
use crate::domain::workload::AmiSpec;

/// Reason recorded for artifacts found at the target
pub const ALREADY_PRESENT: &str = "already present";

/// One image to mirror
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicationTask {
    pub src: String,
    pub target: String,
}

impl ReplicationTask {
    pub fn new(src: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            target: target.into(),
        }
    }

    /// Target repository (host stripped) and tag
    pub fn target_reference(&self) -> (String, String) {
        let (name, tag) = split_tag(&self.target);
        let repository = match ImageReference::parse(name).registry {
            Some(_) => name.split_once('/').map_or(name, |(_, path)| path),
            None => name,
        };
        (repository.to_string(), tag.unwrap_or(DEFAULT_TAG).to_string())
    }

    /// Registry host the source is pulled from
    pub fn source_registry(&self) -> String {
        ImageReference::parse(&self.src)
            .registry_or_default()
            .to_string()
    }
}

impl fmt::Display for ReplicationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.target)
    }
}

/// Individual steps of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    /// Look for the artifact at the target
    CheckTarget,
    /// Create the target repository if needed
    EnsureRepository,
    /// Authenticate against the source chart registry
    SourceLogin,
    Pull,
    Tag,
    Push,
    /// Remove the local copy
    Cleanup,
}

impl TransferStep {
    /// Get human-readable name for the step
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckTarget => "check target",
            Self::EnsureRepository => "ensure repository",
            Self::SourceLogin => "source login",
            Self::Pull => "pull",
            Self::Tag => "tag",
            Self::Push => "push",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationOutcome<T> {
    Succeeded(T),
    Skipped { task: T, reason: String },
    Failed { task: T, reason: String },
}

impl<T> ReplicationOutcome<T> {
    pub fn skipped(task: T) -> Self {
        Self::Skipped {
            task,
            reason: ALREADY_PRESENT.to_string(),
        }
    }

    pub fn failed(task: T, reason: impl fmt::Display) -> Self {
        Self::Failed {
            task,
            reason: reason.to_string(),
        }
    }

    pub fn task(&self) -> &T {
        match self {
            Self::Succeeded(task) | Self::Skipped { task, .. } | Self::Failed { task, .. } => task,
        }
    }

    /// Succeeded and Skipped both count as success
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Outcomes of a batch, partitioned and kept in worklist order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationReport<T> {
    pub succeeded: Vec<ReplicationOutcome<T>>,
    pub failed: Vec<ReplicationOutcome<T>>,
}

impl<T> Default for ReplicationReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> ReplicationReport<T> {
    pub fn record(&mut self, outcome: ReplicationOutcome<T>) {
        if outcome.is_success() {
            self.succeeded.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn skipped(&self) -> usize {
        self.succeeded
            .iter()
            .filter(|outcome| matches!(outcome, ReplicationOutcome::Skipped { .. }))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<T> FromIterator<ReplicationOutcome<T>> for ReplicationReport<T> {
    fn from_iter<I: IntoIterator<Item = ReplicationOutcome<T>>>(iter: I) -> Self {
        let mut report = Self::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

/// `replication-result.json`, consumed by the chart run and by deployments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ami: Option<AmiSpec>,

    #[serde(default)]
    pub charts: BTreeMap<String, ChartValues>,

    #[serde(default)]
    pub additional_images: BTreeMap<String, String>,
}
