use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::resource::{Resource, ResourceKey};

pub const DEFAULT_EXEMPT_LABEL_NAME: &str = "resources.gardener.cloud/managed-by";
pub const DEFAULT_EXEMPT_LABEL_VALUE: &str = "gardener";

pub const DEFAULT_ABORT_NAMESPACE: &str = "center";
pub const DEFAULT_ABORT_CONFIG_MAP: &str = "landscape-state";
pub const DEFAULT_ABORT_FIELD: &str = "deploying";

/// 4 weeks
pub const DEFAULT_FRESHNESS_THRESHOLD_HOURS: u32 = 24 * 28;

/// Settings read from `config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub exempt: Exemption,
    #[serde(default)]
    pub abort: AbortFlagLocation,
    #[serde(default)]
    pub freshness: FreshnessSettings,
    #[serde(default)]
    pub readiness: ReadinessSettings,
}

/// Label name/value pair that exempts a resource from exemption-aware
/// validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exemption {
    #[serde(default = "default_exempt_label_name")]
    pub label_name: String,
    #[serde(default = "default_exempt_label_value")]
    pub label_value: String,
}

impl Default for Exemption {
    fn default() -> Self {
        Self {
            label_name: default_exempt_label_name(),
            label_value: default_exempt_label_value(),
        }
    }
}

impl Exemption {
    pub fn new(label_name: impl Into<String>, label_value: impl Into<String>) -> Self {
        Self {
            label_name: label_name.into(),
            label_value: label_value.into(),
        }
    }

    /// Whether the resource carries the exemption label with the exact value.
    pub fn applies_to(&self, resource: &Resource) -> bool {
        resource
            .labels()
            .get(&self.label_name)
            .is_some_and(|value| *value == self.label_value)
    }
}

/// Coordinate of the abort flag: a field of a namespaced ConfigMap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortFlagLocation {
    #[serde(default = "default_abort_namespace")]
    pub config_map_namespace: String,
    #[serde(default = "default_abort_config_map")]
    pub config_map_name: String,
    #[serde(default = "default_abort_field")]
    pub config_map_field: String,
}

impl Default for AbortFlagLocation {
    fn default() -> Self {
        Self {
            config_map_namespace: default_abort_namespace(),
            config_map_name: default_abort_config_map(),
            config_map_field: default_abort_field(),
        }
    }
}

impl AbortFlagLocation {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            config_map_namespace: namespace.into(),
            config_map_name: name.into(),
            config_map_field: field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessSettings {
    #[serde(default = "default_threshold_hours")]
    pub threshold_in_hours: u32,
}

impl Default for FreshnessSettings {
    fn default() -> Self {
        Self {
            threshold_in_hours: DEFAULT_FRESHNESS_THRESHOLD_HOURS,
        }
    }
}

impl FreshnessSettings {
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(u64::from(self.threshold_in_hours) * 60 * 60)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSettings {
    #[serde(default)]
    pub ignore_missing_resources: bool,
}

/// One record of `allowlist.yaml` or `readinesslist.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub kind: String,
}

impl ListEntry {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            kind: kind.into(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name, &self.namespace)
    }
}

impl From<&ListEntry> for ResourceKey {
    fn from(entry: &ListEntry) -> Self {
        entry.key()
    }
}

/// Free-form view used when rendering settings for `--show-config`.
pub fn describe(settings: &Settings) -> BTreeMap<&'static str, String> {
    let mut out = BTreeMap::new();
    out.insert("exempt.labelName", settings.exempt.label_name.clone());
    out.insert("exempt.labelValue", settings.exempt.label_value.clone());
    out.insert(
        "abort.configMapNamespace",
        settings.abort.config_map_namespace.clone(),
    );
    out.insert("abort.configMapName", settings.abort.config_map_name.clone());
    out.insert("abort.configMapField", settings.abort.config_map_field.clone());
    out.insert(
        "freshness.thresholdInHours",
        settings.freshness.threshold_in_hours.to_string(),
    );
    out.insert(
        "readiness.ignoreMissingResources",
        settings.readiness.ignore_missing_resources.to_string(),
    );
    out
}

fn default_exempt_label_name() -> String {
    DEFAULT_EXEMPT_LABEL_NAME.to_string()
}

fn default_exempt_label_value() -> String {
    DEFAULT_EXEMPT_LABEL_VALUE.to_string()
}

fn default_abort_namespace() -> String {
    DEFAULT_ABORT_NAMESPACE.to_string()
}

fn default_abort_config_map() -> String {
    DEFAULT_ABORT_CONFIG_MAP.to_string()
}

fn default_abort_field() -> String {
    DEFAULT_ABORT_FIELD.to_string()
}

fn default_threshold_hours() -> u32 {
    DEFAULT_FRESHNESS_THRESHOLD_HOURS
}
