//! Image reference parsing and source mappings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag assumed when an image reference carries none
pub const DEFAULT_TAG: &str = "latest";

/// Mapping key used for images without a DNS-qualified registry
pub const DEFAULT_MAPPING_KEY: &str = "default";

/// Registry used by the container tooling when an image names none
pub const IMPLICIT_REGISTRY: &str = "docker.io";

/// A resolved `registry/repository:tag` triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
}

impl ImageReference {
    pub fn new(
        registry: Option<String>,
        repository: impl Into<String>,
        tag: Option<String>,
    ) -> Self {
        Self {
            registry,
            repository: repository.into(),
            tag,
        }
    }

    /// Parse `[registry/]repository[:tag]`.
    ///
    /// The first path segment is only treated as a registry when it looks
    /// like a host (contains `.` or `:`, or is `localhost`).
    pub fn parse(image: &str) -> Self {
        let (name, tag) = split_tag(image);
        match name.split_once('/') {
            Some((host, repository)) if is_registry_host(host) => Self::new(
                Some(host.to_string()),
                repository,
                tag.map(str::to_string),
            ),
            _ => Self::new(None, name, tag.map(str::to_string)),
        }
    }

    /// Registry host, or the implicit Docker Hub registry
    pub fn registry_or_default(&self) -> &str {
        self.registry.as_deref().unwrap_or(IMPLICIT_REGISTRY)
    }

    /// Flattened `registry/repository:tag`
    pub fn image(&self) -> String {
        self.to_string()
    }

    /// Fully qualified form the container engine stores the image under:
    /// `nginx:1` and `docker.io/library/nginx:1` are the same local image.
    pub fn canonical(&self) -> String {
        let registry = match self.registry_or_default() {
            "index.docker.io" | "registry-1.docker.io" => IMPLICIT_REGISTRY,
            other => other,
        };
        let repository = if registry == IMPLICIT_REGISTRY && !self.repository.contains('/') {
            format!("library/{}", self.repository)
        } else {
            self.repository.clone()
        };
        format!(
            "{}/{}:{}",
            registry,
            repository,
            self.tag.as_deref().unwrap_or(DEFAULT_TAG)
        )
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}

/// Split an image into its name and optional tag.
///
/// Only a colon after the last `/` starts a tag, so registry ports survive:
/// `localhost:5000/app` has no tag.
pub fn split_tag(image: &str) -> (&str, Option<&str>) {
    let name_start = image.rfind('/').map_or(0, |slash| slash + 1);
    match image[name_start..].rfind(':') {
        Some(colon) => {
            let split = name_start + colon;
            (&image[..split], Some(&image[split + 1..]))
        }
        None => (image, None),
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// Rewrite an image's source registry according to `mappings`.
///
/// DNS-qualified registries are looked up by host; images without one use the
/// `default` entry. Images with no matching entry are returned untouched.
///
/// ```rust,ignore
/// let mappings = BTreeMap::from([("docker.io".to_string(), "mirror/dh".to_string())]);
/// assert_eq!(
///     apply_image_mapping("docker.io/grafana/grafana:latest", &mappings),
///     "mirror/dh/grafana/grafana:latest"
/// );
/// ```
pub fn apply_image_mapping(image: &str, mappings: &BTreeMap<String, String>) -> String {
    if mappings.is_empty() {
        return image.to_string();
    }

    let (name, tag) = split_tag(image);
    let tag = tag.unwrap_or(DEFAULT_TAG);
    let name = name.trim_end_matches('/');

    match name.split_once('/') {
        // Only dotted hosts are looked up; `host:port` and `localhost` go to `default`
        Some((host, path)) if host.contains('.') => {
            if let Some(mirror) = mappings.get(host) {
                return format!("{}/{}:{}", mirror.trim_end_matches('/'), path, tag);
            }
        }
        _ => {
            if let Some(mirror) = mappings.get(DEFAULT_MAPPING_KEY) {
                return format!("{}/{}:{}", mirror.trim_end_matches('/'), name, tag);
            }
        }
    }

    image.to_string()
}
