//! Resource acquisition.
//!
//! The orchestrator only knows the traits in this module. Where the objects
//! come from (a live cluster, manifests on disk, a test fixture) is up to the
//! implementation:
//!
//! - [`cluster::ClusterProvider`] lists objects through the Kubernetes API
//! - [`manifest::ManifestProvider`] serves an in-memory object set, optionally
//!   loaded from a directory of YAML manifests

pub mod cluster;
pub mod manifest;

use crate::config::AbortFlagLocation;
use crate::resource::{
    KIND_CRON_JOB, KIND_DAEMON_SET, KIND_DEPLOYMENT, KIND_JOB, KIND_POD, KIND_REPLICA_SET,
    KIND_REPLICATION_CONTROLLER, KIND_STATEFUL_SET, Resource,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

pub use cluster::ClusterProvider;
pub use manifest::ManifestProvider;

/// Error type for resource provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to connect to the cluster: {0}")]
    Connection(String),

    #[error("Resource source unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to list {resource_type}: {reason}")]
    List {
        resource_type: String,
        reason: String,
    },

    #[error("Failed to read {namespace}/{name}: {reason}")]
    FlagLookup {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("Failed to load manifests: {0}")]
    Manifest(String),
}

impl ProviderError {
    /// Whether the error means nothing can be fetched at all, as opposed to a
    /// single kind being unavailable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Unreachable(_) | Self::Manifest(_)
        )
    }
}

/// A listable resource type: group/version/resource plus the kind, when known.
///
/// Entries of `additionalResourceTypes.yaml` only name the plural resource;
/// the kind is resolved by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ResourceType {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether a resource belongs to this type.
    ///
    /// Without a known kind the plural is compared against the English
    /// plural of the lowercased kind, which is what the API server uses for
    /// nearly every built-in and custom resource.
    pub fn matches(&self, resource: &Resource) -> bool {
        if resource.group() != self.group {
            return false;
        }
        match &self.kind {
            Some(kind) => resource.kind() == kind,
            None => plural_of(resource.kind()) == self.resource,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

fn plural_of(kind: &str) -> String {
    let kind = kind.to_lowercase();
    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| kind.ends_with(suffix)) {
        return format!("{}es", kind);
    }
    if let Some(stem) = kind.strip_suffix('y')
        && !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
    {
        return format!("{}ies", stem);
    }
    format!("{}s", kind)
}

/// Kinds fetched on every run.
pub fn default_resource_types() -> Vec<ResourceType> {
    vec![
        ResourceType::new("", "v1", "pods").with_kind(KIND_POD),
        ResourceType::new("apps", "v1", "deployments").with_kind(KIND_DEPLOYMENT),
        ResourceType::new("apps", "v1", "replicasets").with_kind(KIND_REPLICA_SET),
        ResourceType::new("apps", "v1", "statefulsets").with_kind(KIND_STATEFUL_SET),
        ResourceType::new("", "v1", "replicationcontrollers").with_kind(KIND_REPLICATION_CONTROLLER),
        ResourceType::new("apps", "v1", "daemonsets").with_kind(KIND_DAEMON_SET),
        ResourceType::new("batch", "v1", "jobs").with_kind(KIND_JOB),
        ResourceType::new("batch", "v1", "cronjobs").with_kind(KIND_CRON_JOB),
    ]
}

/// Source of the resource snapshot.
pub trait ResourceProvider: Send + Sync {
    /// List every object of one resource type.
    fn list(
        &self,
        resource_type: &ResourceType,
    ) -> impl Future<Output = Result<Vec<Resource>, ProviderError>> + Send;
}

/// Source of the abort flag.
pub trait FlagSource: Send + Sync {
    /// Read one field of a namespaced ConfigMap.
    ///
    /// `Ok(None)` means the ConfigMap or the field does not exist.
    fn read_flag(
        &self,
        location: &AbortFlagLocation,
    ) -> impl Future<Output = Result<Option<String>, ProviderError>> + Send;
}

/// Providers that can build themselves when the caller supplied none.
pub trait Connect: Sized {
    fn connect() -> impl Future<Output = Result<Self, ProviderError>> + Send;
}

/// Fetch the snapshot for the given types.
///
/// A failing type is logged and contributes nothing; a fatal error aborts
/// the whole fetch.
pub async fn fetch_resources<P: ResourceProvider>(
    provider: &P,
    resource_types: &[ResourceType],
) -> Result<Vec<Resource>, ProviderError> {
    let mut resources = Vec::new();

    for resource_type in resource_types {
        match provider.list(resource_type).await {
            Ok(mut items) => {
                log::debug!(
                    "There are {} {} in the cluster",
                    items.len(),
                    resource_type.resource
                );
                resources.append(&mut items);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Failed to list resource {}: {}", resource_type, e);
            }
        }
    }

    Ok(resources)
}
