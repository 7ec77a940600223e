//! In-memory stand-ins for the external tools, for tests

use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SecretReference;
use crate::domain::image::{split_tag, ImageReference};
use crate::domain::ChartMetadata;
use crate::error::{CommandError, ConfigError, LoginError, RegistryError};
use crate::infrastructure::docker::ImageTool;
use crate::infrastructure::ecr::{LoginKind, RegistryClient};
use crate::infrastructure::helm::{ChartInfoProvider, ChartTool, ShowKind};
use crate::infrastructure::secrets::{CredentialStore, Credentials};

pub const FAKE_HOST: &str = "123.dkr.ecr.us-east-1.amazonaws.com";

fn failed(command: impl Into<String>) -> CommandError {
    CommandError::Failed {
        command: command.into(),
        code: Some(1),
        stderr: "simulated failure".to_string(),
    }
}

#[derive(Default)]
struct RegistryState {
    repositories: BTreeSet<String>,
    images: BTreeSet<(String, String)>,
    logins: Vec<LoginKind>,
    created: Vec<String>,
    deleted: Vec<String>,
}

/// Stateful target registry
#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<RegistryState>,
    reject_login: bool,
    racing_create: bool,
    failing_delete: HashSet<String>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(self, name: &str) -> Self {
        self.state.lock().unwrap().repositories.insert(name.to_string());
        self
    }

    pub fn with_image(self, name: &str, tag: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.repositories.insert(name.to_string());
            state.images.insert((name.to_string(), tag.to_string()));
        }
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Every create reports that another writer got there first
    pub fn racing_create(mut self) -> Self {
        self.racing_create = true;
        self
    }

    pub fn failing_delete(mut self, name: &str) -> Self {
        self.failing_delete.insert(name.to_string());
        self
    }

    /// Store a pushed `host/repository:tag` reference
    pub fn record_push(&self, reference: &str) {
        let (name, tag) = split_tag(reference);
        let repository = name
            .strip_prefix(FAKE_HOST)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(name);
        let mut state = self.state.lock().unwrap();
        state.repositories.insert(repository.to_string());
        state
            .images
            .insert((repository.to_string(), tag.unwrap_or("latest").to_string()));
    }

    pub fn has_image(&self, name: &str, tag: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .images
            .contains(&(name.to_string(), tag.to_string()))
    }

    pub fn repositories(&self) -> Vec<String> {
        self.state.lock().unwrap().repositories.iter().cloned().collect()
    }

    pub fn logins(&self) -> Vec<LoginKind> {
        self.state.lock().unwrap().logins.clone()
    }

    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    fn host(&self) -> String {
        FAKE_HOST.to_string()
    }

    async fn login(&self, kind: LoginKind) -> Result<(), LoginError> {
        if self.reject_login {
            return Err(LoginError::Rejected {
                kind,
                registry: FAKE_HOST.to_string(),
                source: failed(format!("{} login", kind)),
            });
        }
        self.state.lock().unwrap().logins.push(kind);
        Ok(())
    }

    async fn repository_exists(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.state.lock().unwrap().repositories.contains(name))
    }

    async fn create_repository(&self, name: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock().unwrap();
        state.repositories.insert(name.to_string());
        if self.racing_create {
            return Err(RegistryError::AlreadyExists {
                name: name.to_string(),
            });
        }
        state.created.push(name.to_string());
        Ok(())
    }

    async fn image_exists(&self, name: &str, tag: &str) -> Result<bool, RegistryError> {
        Ok(self.has_image(name, tag))
    }

    async fn list_repositories(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.repositories())
    }

    async fn delete_repository(&self, name: &str) -> Result<(), RegistryError> {
        if self.failing_delete.contains(name) {
            return Err(failed(format!("delete-repository {}", name)).into());
        }
        let mut state = self.state.lock().unwrap();
        if !state.repositories.remove(name) {
            return Err(RegistryError::RepositoryNotFound {
                name: name.to_string(),
            });
        }
        state.images.retain(|(repository, _)| repository != name);
        state.deleted.push(name.to_string());
        Ok(())
    }
}

/// Docker stand-in that pushes into a [`FakeRegistry`]. Pulled images land in
/// one local store shared by every task, as with a single daemon.
pub struct FakeImageTool {
    registry: Arc<FakeRegistry>,
    calls: Mutex<Vec<String>>,
    local: Mutex<HashSet<String>>,
    failing_push: HashSet<String>,
    timing_out_pull: HashSet<String>,
    panicking_pull: HashSet<String>,
    rejecting_login: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl FakeImageTool {
    pub fn new(registry: Arc<FakeRegistry>) -> Self {
        Self {
            registry,
            calls: Mutex::new(Vec::new()),
            local: Mutex::new(HashSet::new()),
            failing_push: HashSet::new(),
            timing_out_pull: HashSet::new(),
            panicking_pull: HashSet::new(),
            rejecting_login: HashSet::new(),
            delays: HashMap::new(),
        }
    }

    pub fn failing_push(mut self, target: &str) -> Self {
        self.failing_push.insert(target.to_string());
        self
    }

    pub fn timing_out_pull(mut self, src: &str) -> Self {
        self.timing_out_pull.insert(src.to_string());
        self
    }

    pub fn panicking_pull(mut self, src: &str) -> Self {
        self.panicking_pull.insert(src.to_string());
        self
    }

    pub fn rejecting_login(mut self, registry: &str) -> Self {
        self.rejecting_login.insert(registry.to_string());
        self
    }

    /// Hold the task for `delay` after `src` is pulled
    pub fn with_delay(mut self, src: &str, delay: Duration) -> Self {
        self.delays.insert(src.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ImageTool for FakeImageTool {
    async fn login(&self, registry: &str, _credentials: &Credentials) -> Result<(), CommandError> {
        self.record(format!("login {}", registry));
        if self.rejecting_login.contains(registry) {
            return Err(failed(format!("docker login {}", registry)));
        }
        Ok(())
    }

    async fn pull(&self, image: &str) -> Result<(), CommandError> {
        self.record(format!("pull {}", image));
        if self.panicking_pull.contains(image) {
            panic!("simulated crash pulling {}", image);
        }
        if self.timing_out_pull.contains(image) {
            return Err(CommandError::TimedOut {
                command: format!("docker pull {}", image),
                timeout: Duration::from_secs(600),
            });
        }
        self.local.lock().unwrap().insert(local_name(image));
        if let Some(delay) = self.delays.get(image) {
            tokio::time::sleep(*delay).await;
        }
        Ok(())
    }

    async fn tag(&self, source: &str, target: &str) -> Result<(), CommandError> {
        self.record(format!("tag {} {}", source, target));
        if !self.local.lock().unwrap().contains(&local_name(source)) {
            return Err(failed(format!("docker tag {} {}: No such image", source, target)));
        }
        Ok(())
    }

    async fn push(&self, image: &str) -> Result<(), CommandError> {
        self.record(format!("push {}", image));
        if self.failing_push.contains(image) {
            return Err(failed(format!("docker push {}", image)));
        }
        self.registry.record_push(image);
        Ok(())
    }

    async fn remove(&self, image: &str) -> Result<(), CommandError> {
        self.record(format!("rmi {}", image));
        self.local.lock().unwrap().remove(&local_name(image));
        Ok(())
    }
}

fn local_name(image: &str) -> String {
    ImageReference::parse(image).canonical()
}

/// Helm transfer stand-in that pushes into a [`FakeRegistry`]
pub struct FakeChartTool {
    registry: Arc<FakeRegistry>,
    calls: Mutex<Vec<String>>,
    failing_pull: HashSet<String>,
}

impl FakeChartTool {
    pub fn new(registry: Arc<FakeRegistry>) -> Self {
        Self {
            registry,
            calls: Mutex::new(Vec::new()),
            failing_pull: HashSet::new(),
        }
    }

    pub fn failing_pull(mut self, reference: &str) -> Self {
        self.failing_pull.insert(reference.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChartTool for FakeChartTool {
    async fn login(&self, registry: &str, _credentials: &Credentials) -> Result<(), CommandError> {
        self.record(format!("login {}", registry));
        Ok(())
    }

    async fn pull(
        &self,
        reference: &str,
        version: &str,
        workdir: &Path,
    ) -> Result<PathBuf, CommandError> {
        self.record(format!("pull {} {}", reference, version));
        if self.failing_pull.contains(reference) {
            return Err(failed(format!("helm pull {}", reference)));
        }
        let name = reference.rsplit('/').next().unwrap_or(reference);
        let package = workdir.join(format!("{}-{}.tgz", name, version));
        // The package records its coordinates so push can find them again
        std::fs::write(&package, format!("{}\n{}", name, version)).map_err(|source| {
            CommandError::Io {
                command: format!("helm pull {}", reference),
                source,
            }
        })?;
        Ok(package)
    }

    async fn push(&self, package: &Path, target: &str) -> Result<(), CommandError> {
        self.record(format!("push {} {}", package.display(), target));
        let content = std::fs::read_to_string(package).map_err(|source| CommandError::Io {
            command: format!("helm push {}", package.display()),
            source,
        })?;
        let (name, version) = content.split_once('\n').unwrap_or((content.as_str(), ""));
        let target = target.strip_prefix("oci://").unwrap_or(target);
        self.registry
            .record_push(&format!("{}/{}:{}", target, name, version.replace('+', "_")));
        Ok(())
    }
}

/// Chart introspection stand-in keyed by chart reference
#[derive(Default)]
pub struct FakeChartInfo {
    charts: HashMap<String, (Value, Value)>,
    subcharts: HashMap<(String, String), ChartMetadata>,
    failing_repos: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeChartInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chart(mut self, reference: &str, chart: &str, values: &str) -> Self {
        self.charts.insert(
            reference.to_string(),
            (
                serde_yaml::from_str(chart).unwrap(),
                serde_yaml::from_str(values).unwrap(),
            ),
        );
        self
    }

    pub fn with_subchart(mut self, reference: &str, subchart: &str, values: &str) -> Self {
        self.subcharts.insert(
            (reference.to_string(), subchart.to_string()),
            ChartMetadata::new(
                serde_yaml::from_str(&format!("name: {}", subchart)).unwrap(),
                serde_yaml::from_str(values).unwrap(),
            ),
        );
        self
    }

    pub fn failing_repo(mut self, alias: &str) -> Self {
        self.failing_repos.insert(alias.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChartInfoProvider for FakeChartInfo {
    async fn show(
        &self,
        kind: ShowKind,
        chart: &str,
        version: &str,
    ) -> Result<Value, CommandError> {
        self.record(format!("show {} {} {}", kind, chart, version));
        let (chart_yaml, values) = self
            .charts
            .get(chart)
            .ok_or_else(|| failed(format!("helm show {} {}", kind, chart)))?;
        Ok(match kind {
            ShowKind::Chart => chart_yaml.clone(),
            ShowKind::Values => values.clone(),
        })
    }

    async fn show_subchart(
        &self,
        chart: &str,
        subchart: &str,
        version: &str,
    ) -> Result<ChartMetadata, CommandError> {
        self.record(format!("show_subchart {} {} {}", chart, subchart, version));
        self.subcharts
            .get(&(chart.to_string(), subchart.to_string()))
            .cloned()
            .ok_or_else(|| failed(format!("helm pull {}", chart)))
    }

    async fn add_repo(
        &self,
        alias: &str,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), CommandError> {
        let auth = if credentials.is_some() { " (auth)" } else { "" };
        self.record(format!("repo add {} {}{}", alias, url, auth));
        if self.failing_repos.contains(alias) {
            return Err(failed(format!("helm repo add {}", alias)));
        }
        Ok(())
    }

    async fn update_repos(&self) -> Result<(), CommandError> {
        self.record("repo update".to_string());
        Ok(())
    }
}

/// Credential store holding secrets by name
#[derive(Default)]
pub struct FakeCredentialStore {
    secrets: BTreeMap<String, Credentials>,
}

impl FakeCredentialStore {
    pub fn with_secret(mut self, name: &str, credentials: Credentials) -> Self {
        self.secrets.insert(name.to_string(), credentials);
        self
    }
}

#[async_trait]
impl CredentialStore for FakeCredentialStore {
    async fn fetch(&self, secret: &SecretReference) -> Result<Option<Credentials>, ConfigError> {
        self.secrets
            .get(&secret.name)
            .cloned()
            .map(Some)
            .ok_or_else(|| ConfigError::SecretUnavailable {
                secret: secret.name.clone(),
                message: "ResourceNotFoundException".to_string(),
            })
    }
}
