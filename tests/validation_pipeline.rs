use std::fs;
use std::path::Path;
use tempfile::TempDir;

use kube_resource_validator::{
    aggregate::{AGGREGATED_MESSAGE, EscalatingAggregator, PostProcessor},
    config::{self, ALLOWLIST_FILE_NAME, CONFIG_FILE_NAME, READINESS_LIST_FILE_NAME},
    provider::ManifestProvider,
    validation::{ExecutionMode, RunOptions, RunState, Validation},
    validators::{allowed_pods, builtin_validators, freshness, privileged_pods, readiness},
};

/// Integration tests for the full pipeline: config directory, manifest
/// snapshot, built-in validators and aggregation.

const CLUSTER: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
---
apiVersion: apps/v1
kind: ReplicaSet
metadata:
  name: web-5d9c
  namespace: shop
  ownerReferences:
  - apiVersion: apps/v1
    kind: Deployment
    name: web
    uid: d1
---
apiVersion: v1
kind: Pod
metadata:
  name: web-5d9c-abcde
  namespace: shop
  creationTimestamp: "2020-01-01T00:00:00Z"
  ownerReferences:
  - apiVersion: apps/v1
    kind: ReplicaSet
    name: web-5d9c
    uid: r1
spec:
  containers:
  - name: app
    image: nginx
---
apiVersion: v1
kind: Pod
metadata:
  name: debug
  namespace: shop
spec:
  containers:
  - name: shell
    image: busybox
    securityContext:
      privileged: true
---
apiVersion: v1
kind: Pod
metadata:
  name: node-agent
  namespace: kube-system
  labels:
    team: platform
spec:
  containers:
  - name: agent
    image: agent
    securityContext:
      privileged: true
---
apiVersion: apps/v1
kind: StatefulSet
metadata:
  name: db
  namespace: shop
status:
  conditions:
  - type: Ready
    status: "False"
"#;

fn write_config(dir: &Path) {
    fs::write(
        dir.join(CONFIG_FILE_NAME),
        "exempt:\n  labelName: team\n  labelValue: platform\nfreshness:\n  thresholdInHours: 24\n",
    )
    .unwrap();
    fs::write(
        dir.join(ALLOWLIST_FILE_NAME),
        "- name: web\n  namespace: shop\n  kind: Deployment\n",
    )
    .unwrap();
    fs::write(
        dir.join(READINESS_LIST_FILE_NAME),
        "- name: db\n  namespace: shop\n  kind: StatefulSet\n- name: cache\n  namespace: shop\n  kind: StatefulSet\n",
    )
    .unwrap();
}

fn validation(dir: &Path) -> Validation<ManifestProvider> {
    let settings = config::load_settings(dir);
    Validation::with_provider(
        RunOptions::from_settings(dir, &settings),
        ManifestProvider::from_yaml(CLUSTER).unwrap(),
    )
}

#[tokio::test]
async fn test_builtin_validators_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path());
    let settings = config::load_settings(temp_dir.path());
    let validators = builtin_validators(temp_dir.path(), &settings);

    let mut validation = validation(temp_dir.path());
    let report = validation.validate(&validators).await.unwrap();
    assert!(report.combined_error().is_none());
    assert_eq!(validation.state(), RunState::Completed);

    let found: Vec<(&str, &str)> = report
        .violations
        .iter()
        .map(|v| (v.validator.as_str(), v.target.name.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (allowed_pods::NAME, "debug"),
            (readiness::NAME, "db"),
            (readiness::NAME, "cache"),
            (freshness::NAME, "web-5d9c-abcde"),
            (privileged_pods::NAME, "debug"),
        ]
    );

    let aggregated = EscalatingAggregator::new().process(report.violations);
    let summary: Vec<(&str, &str, u32)> = aggregated
        .iter()
        .map(|v| (v.target.name.as_str(), v.validator.as_str(), v.level))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("debug", "built-in:allowed-pods+built-in:privileged-pods", 0),
            ("db", readiness::NAME, 1),
            ("cache", readiness::NAME, 1),
            ("web-5d9c-abcde", freshness::NAME, 1),
        ]
    );
    assert_eq!(aggregated[0].message, AGGREGATED_MESSAGE);
}

#[tokio::test]
async fn test_missing_list_files_fail_only_their_validators() {
    let temp_dir = TempDir::new().unwrap();
    let settings = config::load_settings(temp_dir.path());
    let validators = builtin_validators(temp_dir.path(), &settings);

    let mut validation = validation(temp_dir.path());
    let report = validation.validate(&validators).await.unwrap();

    let failed: Vec<&str> = report.failures.iter().map(|f| f.validator.as_str()).collect();
    assert_eq!(failed, vec![allowed_pods::NAME, readiness::NAME]);

    // Default exemption label does not match, so both privileged pods remain
    let privileged = report
        .violations
        .iter()
        .filter(|v| v.validator == privileged_pods::NAME)
        .count();
    assert_eq!(privileged, 2);

    let combined = report.combined_error().unwrap().to_string();
    assert!(combined.contains(ALLOWLIST_FILE_NAME));
    assert!(combined.contains(READINESS_LIST_FILE_NAME));
}

#[tokio::test]
async fn test_parallel_run_matches_sequential() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path());
    let settings = config::load_settings(temp_dir.path());
    let validators = builtin_validators(temp_dir.path(), &settings);

    let sequential = validation(temp_dir.path())
        .validate(&validators)
        .await
        .unwrap();

    let mut parallel = Validation::with_provider(
        RunOptions::from_settings(temp_dir.path(), &settings).with_mode(ExecutionMode::Parallel),
        ManifestProvider::from_yaml(CLUSTER).unwrap(),
    );
    let parallel = parallel.validate(&validators).await.unwrap();

    assert_eq!(sequential, parallel);
}

#[tokio::test]
async fn test_abort_flag_from_config_location() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path());
    fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "abort:\n  configMapNamespace: ops\n  configMapName: rollout\n  configMapField: frozen\n",
    )
    .unwrap();
    let settings = config::load_settings(temp_dir.path());
    let validators = builtin_validators(temp_dir.path(), &settings);

    let manifests = format!(
        "{}\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: rollout\n  namespace: ops\ndata:\n  frozen: \"true\"\n",
        CLUSTER
    );
    let mut validation = Validation::with_provider(
        RunOptions::from_settings(temp_dir.path(), &settings),
        ManifestProvider::from_yaml(&manifests).unwrap(),
    );

    let report = validation.validate(&validators).await.unwrap();
    assert!(report.aborted);
    assert!(report.violations.is_empty());
    assert_eq!(validation.state(), RunState::Aborted);
}
