//! Offline provider over a fixed object set.
//!
//! Objects come either from code (tests, embedding applications) or from a
//! directory of YAML manifests. The abort flag is read from the ConfigMaps of
//! the same set, so an offline run behaves like a run against a cluster that
//! holds exactly these objects.

use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use super::{Connect, FlagSource, ProviderError, ResourceProvider, ResourceType};
use crate::config::AbortFlagLocation;
use crate::resource::{KIND_CONFIG_MAP, Resource};

/// Resource provider serving a fixed set of objects.
#[derive(Debug, Clone, Default)]
pub struct ManifestProvider {
    objects: Vec<Resource>,
    failing_types: HashSet<String>,
    unreachable: bool,
}

impl ManifestProvider {
    pub fn new(objects: Vec<Resource>) -> Self {
        Self {
            objects,
            ..Default::default()
        }
    }

    /// Parse a YAML string containing one or more Kubernetes objects.
    /// `List` objects are flattened into their items.
    pub fn from_yaml(content: &str) -> Result<Self, ProviderError> {
        Ok(Self::new(parse_yaml(content)?))
    }

    /// Load all `.yaml`/`.yml` files below a directory (recursively).
    pub fn from_dir(path: &Path) -> Result<Self, ProviderError> {
        if !path.is_dir() {
            return Err(ProviderError::Manifest(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let mut objects = Vec::new();
        for entry in walkdir::WalkDir::new(path)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let entry_path = entry.path();
            let ext = entry_path.extension().and_then(|e| e.to_str());
            if !entry_path.is_file() || !matches!(ext, Some("yaml") | Some("yml")) {
                continue;
            }

            let content = match std::fs::read_to_string(entry_path) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("Failed to read {}: {}", entry_path.display(), e);
                    continue;
                }
            };
            match parse_yaml(&content) {
                Ok(mut parsed) => objects.append(&mut parsed),
                Err(e) => {
                    // Keep going with the remaining files
                    log::warn!("Failed to parse {}: {}", entry_path.display(), e);
                }
            }
        }

        log::info!(
            "Loaded {} objects from manifests in {}",
            objects.len(),
            path.display()
        );
        Ok(Self::new(objects))
    }

    /// Make listing of one resource type (by plural name) fail.
    pub fn with_failing_type(mut self, resource: impl Into<String>) -> Self {
        self.failing_types.insert(resource.into());
        self
    }

    /// Make every operation fail as if the source could not be reached.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn objects(&self) -> &[Resource] {
        &self.objects
    }
}

impl Connect for ManifestProvider {
    async fn connect() -> Result<Self, ProviderError> {
        Err(ProviderError::Connection(
            "manifest provider has no default source".to_string(),
        ))
    }
}

impl ResourceProvider for ManifestProvider {
    async fn list(&self, resource_type: &ResourceType) -> Result<Vec<Resource>, ProviderError> {
        if self.unreachable {
            return Err(ProviderError::Unreachable(
                "manifest source unavailable".to_string(),
            ));
        }
        if self.failing_types.contains(&resource_type.resource) {
            return Err(ProviderError::List {
                resource_type: resource_type.to_string(),
                reason: "listing disabled".to_string(),
            });
        }

        Ok(self
            .objects
            .iter()
            .filter(|object| resource_type.matches(object))
            .cloned()
            .collect())
    }
}

impl FlagSource for ManifestProvider {
    async fn read_flag(&self, location: &AbortFlagLocation) -> Result<Option<String>, ProviderError> {
        if self.unreachable {
            return Err(ProviderError::FlagLookup {
                namespace: location.config_map_namespace.clone(),
                name: location.config_map_name.clone(),
                reason: "manifest source unavailable".to_string(),
            });
        }

        let config_map = self.objects.iter().find(|object| {
            object.kind() == KIND_CONFIG_MAP
                && object.name() == location.config_map_name
                && object.namespace() == location.config_map_namespace
        });

        Ok(config_map
            .and_then(|cm| cm.field(&["data", location.config_map_field.as_str()]))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

fn parse_yaml(content: &str) -> Result<Vec<Resource>, ProviderError> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value: Value = serde::Deserialize::deserialize(document)
            .map_err(|e| ProviderError::Manifest(e.to_string()))?;
        collect_objects(value, &mut objects);
    }

    Ok(objects)
}

fn collect_objects(value: Value, objects: &mut Vec<Resource>) {
    if value.is_null() {
        // Empty document between separators
        return;
    }

    let is_list = value
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"));
    if is_list {
        if let Some(Value::Array(items)) = value.get("items") {
            for item in items {
                collect_objects(item.clone(), objects);
            }
        }
        return;
    }

    match Resource::from_json(value) {
        Ok(resource) => objects.push(resource),
        Err(e) => log::debug!("Skipping manifest document: {}", e),
    }
}
