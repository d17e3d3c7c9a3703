pub mod types;

use crate::error::ConfigError;
use crate::provider::ResourceType;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use types::{
    AbortFlagLocation, Exemption, FreshnessSettings, ListEntry, ReadinessSettings, Settings,
};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const ALLOWLIST_FILE_NAME: &str = "allowlist.yaml";
pub const READINESS_LIST_FILE_NAME: &str = "readinesslist.yaml";
pub const ADDITIONAL_RESOURCE_TYPES_FILE_NAME: &str = "additionalResourceTypes.yaml";

pub const CONFIG_DIR_ENV: &str = "CONFIG_DIR";
pub const DEFAULT_CONFIG_DIR: &str = "/config/";

/// Resolve the configuration directory.
/// An explicit directory wins, then `CONFIG_DIR`, then `/config/`.
pub fn resolve_config_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_CONFIG_DIR),
    }
}

/// Load `config.yaml` from the config directory.
///
/// The file is optional. A missing or unparsable file yields defaults; the
/// latter is logged since it usually means a typo in the deployment.
pub fn load_settings(config_dir: &Path) -> Settings {
    let path = config_dir.join(CONFIG_FILE_NAME);
    match read_yaml::<Settings>(&path) {
        Ok(settings) => normalize(settings),
        Err(ConfigError::NotFound(_)) => {
            log::debug!("No {} found, using default settings", path.display());
            Settings::default()
        }
        Err(e) => {
            log::warn!("{}; using default settings", e);
            Settings::default()
        }
    }
}

/// Read a `{name, namespace, kind}` list file such as `allowlist.yaml`.
pub fn read_entry_list(path: &Path) -> Result<Vec<ListEntry>, ConfigError> {
    // An empty file parses as null
    Ok(read_yaml::<Option<Vec<ListEntry>>>(path)?.unwrap_or_default())
}

/// Read `additionalResourceTypes.yaml` from the config directory.
///
/// A missing file means no additional kinds; any other failure is returned.
pub fn read_additional_resource_types(config_dir: &Path) -> Result<Vec<ResourceType>, ConfigError> {
    let path = config_dir.join(ADDITIONAL_RESOURCE_TYPES_FILE_NAME);
    match read_yaml::<Option<Vec<ResourceType>>>(&path) {
        Ok(types) => Ok(types.unwrap_or_default()),
        Err(ConfigError::NotFound(_)) => {
            log::info!(
                "Couldn't find additional resource types file {}",
                path.display()
            );
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
        _ => ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::ParsingFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Empty strings and a zero threshold fall back to the defaults.
fn normalize(mut settings: Settings) -> Settings {
    let defaults = Settings::default();

    if settings.exempt.label_name.is_empty() {
        settings.exempt.label_name = defaults.exempt.label_name;
    }
    if settings.exempt.label_value.is_empty() {
        settings.exempt.label_value = defaults.exempt.label_value;
    }
    if settings.abort.config_map_namespace.is_empty() {
        settings.abort.config_map_namespace = defaults.abort.config_map_namespace;
    }
    if settings.abort.config_map_name.is_empty() {
        settings.abort.config_map_name = defaults.abort.config_map_name;
    }
    if settings.abort.config_map_field.is_empty() {
        settings.abort.config_map_field = defaults.abort.config_map_field;
    }
    if settings.freshness.threshold_in_hours == 0 {
        settings.freshness.threshold_in_hours = defaults.freshness.threshold_in_hours;
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_partial_config_overrides_only_given_keys() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "exempt:\n  labelName: team\nabort:\n  configMapName: rollout\n  configMapField: \"\"\nfreshness:\n  thresholdInHours: 12\n",
        )
        .unwrap();

        let settings = load_settings(dir.path());
        assert_eq!(settings.exempt.label_name, "team");
        assert_eq!(settings.exempt.label_value, types::DEFAULT_EXEMPT_LABEL_VALUE);
        assert_eq!(settings.abort.config_map_name, "rollout");
        assert_eq!(settings.abort.config_map_field, types::DEFAULT_ABORT_FIELD);
        assert_eq!(settings.abort.config_map_namespace, types::DEFAULT_ABORT_NAMESPACE);
        assert_eq!(settings.freshness.threshold_in_hours, 12);
        assert!(!settings.readiness.ignore_missing_resources);
    }

    #[test]
    fn test_unparsable_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "exempt: [unterminated").unwrap();
        assert_eq!(load_settings(dir.path()), Settings::default());
    }

    #[test]
    fn test_read_entry_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ALLOWLIST_FILE_NAME);
        fs::write(
            &path,
            "- name: web\n  namespace: shop\n  kind: Deployment\n- name: node-agent\n  namespace: kube-system\n  kind: DaemonSet\n",
        )
        .unwrap();

        let entries = read_entry_list(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ListEntry::new("Deployment", "web", "shop"));
    }

    #[test]
    fn test_read_entry_list_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_entry_list(&dir.path().join(ALLOWLIST_FILE_NAME)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_entry_list_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(READINESS_LIST_FILE_NAME);
        fs::write(&path, "").unwrap();
        assert!(read_entry_list(&path).unwrap().is_empty());
    }

    #[test]
    fn test_additional_resource_types() {
        let dir = TempDir::new().unwrap();
        assert!(read_additional_resource_types(dir.path()).unwrap().is_empty());

        fs::write(
            dir.path().join(ADDITIONAL_RESOURCE_TYPES_FILE_NAME),
            "- group: networking.k8s.io\n  version: v1\n  resource: ingresses\n",
        )
        .unwrap();
        let types = read_additional_resource_types(dir.path()).unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].group, "networking.k8s.io");
        assert_eq!(types[0].resource, "ingresses");
        assert!(types[0].kind.is_none());

        fs::write(
            dir.path().join(ADDITIONAL_RESOURCE_TYPES_FILE_NAME),
            "group: not-a-list",
        )
        .unwrap();
        assert!(read_additional_resource_types(dir.path()).is_err());
    }

    #[test]
    fn test_explicit_config_dir_wins() {
        let dir = resolve_config_dir(Some(Path::new("/etc/validator")));
        assert_eq!(dir, PathBuf::from("/etc/validator"));
    }
}
