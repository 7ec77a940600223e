//! Replication executor - copies artifacts into the mirror
//!
//! Each task runs CheckTarget -> EnsureRepository -> transfer. An artifact
//! already present at the target is skipped, so re-running a batch only
//! retries what failed before. A failed task never stops the batch; only a
//! rejected target registry login does, before any task starts.

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::image::ImageReference;
use crate::domain::{ChartTask, ReplicationOutcome, ReplicationReport, ReplicationTask, TransferStep};
use crate::error::{LoginError, RegistryError, TransferError};
use crate::infrastructure::docker::ImageTool;
use crate::infrastructure::ecr::{LoginKind, RegistryClient};
use crate::infrastructure::helm::ChartTool;
use crate::infrastructure::secrets::Credentials;

/// Executor tuning and shared inputs
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Tasks run at once; 1 keeps the batch sequential
    pub workers: usize,
    /// Source registry credentials, if any
    pub source_credentials: Option<Credentials>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            source_credentials: None,
        }
    }
}

/// How a task that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Copied,
    AlreadyPresent,
}

#[async_trait]
trait TaskWorker<T>: Send + Sync {
    async fn process(&self, task: &T) -> Result<Transfer, TransferError>;
}

/// Service for replicating images and charts
pub struct ReplicationExecutor {
    registry: Arc<dyn RegistryClient>,
    settings: ExecutorSettings,
}

impl ReplicationExecutor {
    pub fn new(registry: Arc<dyn RegistryClient>, settings: ExecutorSettings) -> Self {
        Self { registry, settings }
    }

    /// Mirror container images
    pub async fn replicate_images(
        &self,
        images: Arc<dyn ImageTool>,
        tasks: Vec<ReplicationTask>,
    ) -> Result<ReplicationReport<ReplicationTask>, LoginError> {
        self.registry.login(LoginKind::Docker).await?;

        if let Some(credentials) = &self.settings.source_credentials {
            let hosts: BTreeSet<String> = tasks.iter().map(|t| t.source_registry()).collect();
            for host in hosts {
                match images.login(&host, credentials).await {
                    Ok(()) => debug!("Logged into source registry {}", host),
                    Err(e) => warn!("Source login to {} failed, pulls may fail: {}", host, e),
                }
            }
        } else {
            info!("Not using any auth for source repos for images");
        }

        let worker = Arc::new(ImageWorker {
            registry: self.registry.clone(),
            images,
            sources: SourceLocks::default(),
        });
        Ok(run_batch(worker, tasks, self.settings.workers).await)
    }

    /// Mirror OCI charts
    pub async fn replicate_charts(
        &self,
        charts: Arc<dyn ChartTool>,
        tasks: Vec<ChartTask>,
    ) -> Result<ReplicationReport<ChartTask>, LoginError> {
        self.registry.login(LoginKind::Helm).await?;

        let worker = Arc::new(ChartWorker {
            registry: self.registry.clone(),
            charts,
            source_credentials: self.settings.source_credentials.clone(),
        });
        Ok(run_batch(worker, tasks, self.settings.workers).await)
    }
}

/// One lock per local image. The engine keeps a single local store, so two
/// tasks naming the same image (`nginx:1`, `docker.io/library/nginx:1`) must
/// not interleave pull, tag and rmi.
#[derive(Default)]
struct SourceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SourceLocks {
    async fn acquire(&self, source: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(ImageReference::parse(source).canonical())
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}

struct ImageWorker {
    registry: Arc<dyn RegistryClient>,
    images: Arc<dyn ImageTool>,
    sources: SourceLocks,
}

#[async_trait]
impl TaskWorker<ReplicationTask> for ImageWorker {
    async fn process(&self, task: &ReplicationTask) -> Result<Transfer, TransferError> {
        let (repository, tag) = task.target_reference();

        let present = self
            .registry
            .image_exists(&repository, &tag)
            .await
            .map_err(|e| TransferError::registry(TransferStep::CheckTarget, e))?;
        if present {
            return Ok(Transfer::AlreadyPresent);
        }

        ensure_repository(self.registry.as_ref(), &repository).await?;

        // Held from pull through rmi
        let _local = self.sources.acquire(&task.src).await;
        self.images
            .pull(&task.src)
            .await
            .map_err(|e| TransferError::command(TransferStep::Pull, e))?;
        self.images
            .tag(&task.src, &task.target)
            .await
            .map_err(|e| TransferError::command(TransferStep::Tag, e))?;
        self.images
            .push(&task.target)
            .await
            .map_err(|e| TransferError::command(TransferStep::Push, e))?;
        self.images
            .remove(&task.src)
            .await
            .map_err(|e| TransferError::command(TransferStep::Cleanup, e))?;

        Ok(Transfer::Copied)
    }
}

struct ChartWorker {
    registry: Arc<dyn RegistryClient>,
    charts: Arc<dyn ChartTool>,
    source_credentials: Option<Credentials>,
}

#[async_trait]
impl TaskWorker<ChartTask> for ChartWorker {
    async fn process(&self, task: &ChartTask) -> Result<Transfer, TransferError> {
        let repository = task.target_repository_name();

        let present = self
            .registry
            .image_exists(repository, &task.target_tag())
            .await
            .map_err(|e| TransferError::registry(TransferStep::CheckTarget, e))?;
        if present {
            return Ok(Transfer::AlreadyPresent);
        }

        ensure_repository(self.registry.as_ref(), repository).await?;

        if let (Some(host), Some(credentials)) = (task.source_registry(), &self.source_credentials)
        {
            self.charts
                .login(host, credentials)
                .await
                .map_err(|e| TransferError::command(TransferStep::SourceLogin, e))?;
        }

        // Package is removed with the directory
        let workdir = tempfile::tempdir().map_err(TransferError::Workspace)?;
        let package = self
            .charts
            .pull(&task.pull_reference(), &task.version, workdir.path())
            .await
            .map_err(|e| TransferError::command(TransferStep::Pull, e))?;
        self.charts
            .push(&package, task.push_target())
            .await
            .map_err(|e| TransferError::command(TransferStep::Push, e))?;

        Ok(Transfer::Copied)
    }
}

/// Create the repository unless it exists. Losing a creation race is fine.
async fn ensure_repository(registry: &dyn RegistryClient, name: &str) -> Result<(), TransferError> {
    let step = TransferStep::EnsureRepository;
    let exists = registry
        .repository_exists(name)
        .await
        .map_err(|e| TransferError::registry(step, e))?;
    if exists {
        debug!("{} found in the registry", name);
        return Ok(());
    }

    info!("{} not found in the registry, creating", name);
    match registry.create_repository(name).await {
        Ok(()) | Err(RegistryError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(TransferError::registry(step, e)),
    }
}

/// Run every task on a bounded pool, returning outcomes in worklist order
async fn run_batch<T, W>(worker: Arc<W>, tasks: Vec<T>, workers: usize) -> ReplicationReport<T>
where
    T: Clone + Display + Send + Sync + 'static,
    W: TaskWorker<T> + 'static,
{
    let progress = ProgressBar::new(tasks.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    let worklist = tasks.clone();

    for (index, task) in tasks.into_iter().enumerate() {
        let worker = worker.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            let attempt = task.clone();
            // Run in its own task so a panic becomes a failed outcome
            let joined = tokio::spawn(async move { worker.process(&attempt).await }).await;
            let outcome = match joined {
                Ok(Ok(Transfer::Copied)) => ReplicationOutcome::Succeeded(task),
                Ok(Ok(Transfer::AlreadyPresent)) => ReplicationOutcome::skipped(task),
                Ok(Err(e)) => ReplicationOutcome::failed(task, e),
                Err(e) => ReplicationOutcome::failed(task, format!("worker aborted: {}", e)),
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<ReplicationOutcome<T>>> = std::iter::repeat_with(|| None)
        .take(set.len())
        .collect();
    while let Some(joined) = set.join_next().await {
        let (index, outcome) = match joined {
            Ok(reported) => reported,
            Err(e) => {
                warn!("Worker did not report back: {}", e);
                continue;
            }
        };
        match &outcome {
            ReplicationOutcome::Succeeded(task) => info!("Replicated {}", task),
            ReplicationOutcome::Skipped { task, reason } => info!("{}: {}, skipping", task, reason),
            ReplicationOutcome::Failed { task, reason } => warn!("FAILED {}: {}", task, reason),
        }
        progress.set_message(outcome.task().to_string());
        progress.inc(1);
        slots[index] = Some(outcome);
    }
    progress.finish_and_clear();

    complete_batch(slots, worklist)
}

/// Pair every task with its outcome. A task whose worker never reported is
/// recorded as failed, so the report always covers the whole worklist.
fn complete_batch<T>(
    slots: Vec<Option<ReplicationOutcome<T>>>,
    worklist: Vec<T>,
) -> ReplicationReport<T> {
    slots
        .into_iter()
        .zip(worklist)
        .map(|(slot, task)| {
            slot.unwrap_or_else(|| {
                ReplicationOutcome::failed(task, "worker did not report an outcome")
            })
        })
        .collect()
}
