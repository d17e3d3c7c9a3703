//! Resource model for fetched cluster objects.
//!
//! A [`Resource`] is an untyped Kubernetes object: the identity fields and
//! metadata the validators need are lifted into typed fields, and the rest of
//! the object (spec, status, data, ...) is kept as raw JSON so validators can
//! reach into arbitrary fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const KIND_POD: &str = "Pod";
pub const KIND_REPLICATION_CONTROLLER: &str = "ReplicationController";
pub const KIND_DEPLOYMENT: &str = "Deployment";
pub const KIND_REPLICA_SET: &str = "ReplicaSet";
pub const KIND_DAEMON_SET: &str = "DaemonSet";
pub const KIND_STATEFUL_SET: &str = "StatefulSet";
pub const KIND_JOB: &str = "Job";
pub const KIND_CRON_JOB: &str = "CronJob";
pub const KIND_CONFIG_MAP: &str = "ConfigMap";

/// Errors raised while decoding a raw object into a [`Resource`].
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("object has no kind")]
    MissingKind,

    #[error("object has no metadata.name")]
    MissingName,

    #[error("invalid object metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("object is not a mapping")]
    NotAnObject,
}

/// A back-link from a resource to its controlling parent.
///
/// Owner references never carry a namespace; the owner always lives in the
/// namespace of the owned resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

impl OwnerReference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Identity triple used for allowlist and readiness lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl ResourceKey {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// The identity of an owner, which inherits this key's namespace.
    pub fn owner(&self, owner: &OwnerReference) -> Self {
        Self::new(&owner.kind, &owner.name, &self.namespace)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Reference to the resource a violation was raised against.
///
/// Unlike [`ResourceKey`] this also carries the API group, since violations
/// are grouped by (kind, name, namespace, group).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub api_version: String,
}

impl ResourceRef {
    /// API group, empty for the core group.
    pub fn group(&self) -> &str {
        api_group(&self.api_version)
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name, &self.namespace)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name: {}; namespace: {}, kind: {}",
            self.name, self.namespace, self.kind
        )
    }
}

/// A fetched cluster object.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    api_version: String,
    kind: String,
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    owner_references: Vec<OwnerReference>,
    creation_timestamp: Option<DateTime<Utc>>,
    object: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    owner_references: Option<Vec<OwnerReference>>,
    #[serde(default)]
    creation_timestamp: Option<DateTime<Utc>>,
}

impl Resource {
    /// Create a bare resource with the given identity and no body.
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            owner_references: Vec::new(),
            creation_timestamp: None,
            object: Value::Object(Map::new()),
        }
    }

    /// Decode a raw Kubernetes object (as returned by the API server or read
    /// from a manifest).
    pub fn from_json(object: Value) -> Result<Self, ResourceError> {
        let map = object.as_object().ok_or(ResourceError::NotAnObject)?;

        let kind = map
            .get("kind")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or(ResourceError::MissingKind)?
            .to_string();
        let api_version = map
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or("v1")
            .to_string();

        let metadata: RawMetadata = match map.get("metadata") {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => RawMetadata::default(),
        };
        let name = metadata
            .name
            .filter(|n| !n.is_empty())
            .ok_or(ResourceError::MissingName)?;

        Ok(Self {
            api_version,
            kind,
            name,
            namespace: metadata.namespace.unwrap_or_default(),
            labels: metadata.labels.unwrap_or_default(),
            owner_references: metadata.owner_references.unwrap_or_default(),
            creation_timestamp: metadata.creation_timestamp,
            object,
        })
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn with_owner(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.owner_references.push(OwnerReference::new(kind, name));
        self
    }

    pub fn with_creation_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.creation_timestamp = Some(timestamp);
        self
    }

    /// Set a top-level section of the object body, e.g. `spec` or `status`.
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.object {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn group(&self) -> &str {
        api_group(&self.api_version)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        &self.owner_references
    }

    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.creation_timestamp
    }

    pub fn is_pod(&self) -> bool {
        self.kind == KIND_POD
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name, &self.namespace)
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            kind: self.kind.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            api_version: self.api_version.clone(),
        }
    }

    /// Look up a nested field of the raw object, e.g. `["status", "ready"]`.
    pub fn field(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.object, |current, segment| current.get(*segment))
    }

    /// Raw object body.
    pub fn object(&self) -> &Value {
        &self.object
    }
}

/// Pods of a snapshot, in snapshot order.
pub fn pods(resources: &[Resource]) -> impl Iterator<Item = &Resource> {
    resources.iter().filter(|r| r.is_pod())
}

/// Find a resource by identity within a snapshot.
pub fn find<'a>(resources: &'a [Resource], key: &ResourceKey) -> Option<&'a Resource> {
    resources.iter().find(|r| {
        r.kind == key.kind && r.name == key.name && r.namespace == key.namespace
    })
}

fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}
