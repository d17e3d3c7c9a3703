//! Run orchestration.
//!
//! A [`Validation`] drives one or more runs over a single snapshot:
//!
//! 1. connect to the provider (once, when none was supplied)
//! 2. resolve the resource types (defaults plus `additionalResourceTypes.yaml`)
//! 3. fetch the snapshot
//! 4. evaluate the abort gate
//! 5. invoke every validator against the shared snapshot
//!
//! Steps 1-4 happen at most once per instance after they succeed; later calls
//! reuse the snapshot. A validator that fails is recorded in the report and
//! does not stop the others.

pub mod abort;

use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{self, AbortFlagLocation, Settings};
use crate::error::ConfigError;
use crate::provider::{
    ClusterProvider, Connect, FlagSource, ProviderError, ResourceProvider, default_resource_types,
    fetch_resources,
};
use crate::resource::Resource;
use crate::validators::{Validator, ValidatorError, Violation};

pub use abort::{AbortDecision, AbortGate, AbortPredicate};

/// Fatal run failures. No validator has run when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Unable to create client: {0}")]
    Setup(#[source] ProviderError),

    #[error("Failed to fetch resources: {0}")]
    Fetch(#[source] ProviderError),

    #[error("Fetching resources timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("Failed to read additional resource types: {0}")]
    AdditionalResourceTypes(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Validators run on the rayon thread pool; results keep list order.
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Prevalidated,
    Completed,
    Aborted,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_dir: PathBuf,
    pub abort: AbortFlagLocation,
    pub fetch_timeout: Option<Duration>,
    pub mode: ExecutionMode,
}

impl RunOptions {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            abort: AbortFlagLocation::default(),
            fetch_timeout: None,
            mode: ExecutionMode::default(),
        }
    }

    /// Options for a config directory and its loaded settings.
    pub fn from_settings(config_dir: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            abort: settings.abort.clone(),
            ..Self::new(config_dir)
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A validator that could not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorFailure {
    pub validator: String,
    pub error: ValidatorError,
}

impl fmt::Display for ValidatorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.validator, self.error)
    }
}

/// All validator failures of one run, as a single error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorErrors(pub Vec<ValidatorFailure>);

impl fmt::Display for ValidatorErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidatorErrors {}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub failures: Vec<ValidatorFailure>,
    pub aborted: bool,
}

impl ValidationReport {
    fn aborted() -> Self {
        Self {
            aborted: true,
            ..Default::default()
        }
    }

    /// The validator failures as one error, or `None` if every validator ran.
    pub fn combined_error(&self) -> Option<ValidatorErrors> {
        if self.failures.is_empty() {
            None
        } else {
            Some(ValidatorErrors(self.failures.clone()))
        }
    }
}

/// Orchestrates validation runs over one snapshot.
pub struct Validation<P = ClusterProvider> {
    options: RunOptions,
    provider: Option<P>,
    gate: AbortGate,
    state: RunState,
    snapshot: Option<Vec<Resource>>,
}

impl Validation<ClusterProvider> {
    /// Run against the cluster from the inferred kube configuration.
    pub fn new(options: RunOptions) -> Self {
        Self::unconnected(options)
    }
}

impl<P> Validation<P>
where
    P: ResourceProvider + FlagSource + Connect,
{
    /// Connect to the default provider lazily on the first run.
    pub fn unconnected(options: RunOptions) -> Self {
        let gate = AbortGate::Flag(options.abort.clone());
        Self {
            options,
            provider: None,
            gate,
            state: RunState::Uninitialized,
            snapshot: None,
        }
    }

    pub fn with_provider(options: RunOptions, provider: P) -> Self {
        Self {
            provider: Some(provider),
            ..Self::unconnected(options)
        }
    }

    /// Replace the flag lookup with a custom abort decision.
    pub fn with_abort_predicate(
        mut self,
        predicate: impl Fn(&[Resource]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.gate = AbortGate::predicate(predicate);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The cached snapshot, once prevalidation succeeded.
    pub fn resources(&self) -> Option<&[Resource]> {
        self.snapshot.as_deref()
    }

    pub fn provider(&self) -> Option<&P> {
        self.provider.as_ref()
    }

    /// Run the validators in order against the snapshot.
    ///
    /// An aborted run returns an empty report with `aborted` set. Validator
    /// failures are part of the report, not an `Err`.
    pub async fn validate(
        &mut self,
        validators: &[Box<dyn Validator>],
    ) -> Result<ValidationReport, ValidationError> {
        let resources = match self.snapshot.take() {
            Some(resources) => resources,
            None => match self.prevalidate().await {
                Ok(Some(resources)) => resources,
                Ok(None) => {
                    self.state = RunState::Aborted;
                    return Ok(ValidationReport::aborted());
                }
                Err(e) => {
                    log::error!("{}", e);
                    self.state = RunState::Failed;
                    return Err(e);
                }
            },
        };

        let report = run_validators(validators, &resources, self.options.mode);
        self.snapshot = Some(resources);
        self.state = RunState::Completed;
        Ok(report)
    }

    /// Fetch the snapshot and evaluate the abort gate.
    /// `None` means the gate aborted the run.
    async fn prevalidate(&mut self) -> Result<Option<Vec<Resource>>, ValidationError> {
        let provider = match self.provider.take() {
            Some(provider) => provider,
            None => P::connect().await.map_err(ValidationError::Setup)?,
        };
        let provider = self.provider.insert(provider);

        let mut resource_types = default_resource_types();
        resource_types.extend(config::read_additional_resource_types(
            &self.options.config_dir,
        )?);

        let fetch = fetch_resources(&*provider, &resource_types);
        let fetched = match self.options.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| ValidationError::FetchTimeout(limit))?,
            None => fetch.await,
        };
        let resources = fetched.map_err(ValidationError::Fetch)?;
        log::info!("Fetched {} resources", resources.len());

        self.state = RunState::Prevalidated;

        let decision = self
            .gate
            .evaluate(&*provider, &resources, self.options.fetch_timeout)
            .await;
        Ok(match decision {
            AbortDecision::Abort => None,
            AbortDecision::Proceed => Some(resources),
        })
    }
}

fn run_validators(
    validators: &[Box<dyn Validator>],
    resources: &[Resource],
    mode: ExecutionMode,
) -> ValidationReport {
    let outcomes: Vec<Result<Vec<Violation>, ValidatorFailure>> = match mode {
        ExecutionMode::Sequential => validators
            .iter()
            .map(|validator| run_one(validator.as_ref(), resources))
            .collect(),
        ExecutionMode::Parallel => validators
            .par_iter()
            .map(|validator| run_one(validator.as_ref(), resources))
            .collect(),
    };

    let mut report = ValidationReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(mut violations) => report.violations.append(&mut violations),
            Err(failure) => report.failures.push(failure),
        }
    }
    report
}

fn run_one(validator: &dyn Validator, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorFailure> {
    log::debug!("Running validator {}", validator.name());
    validator.validate(resources).map_err(|error| {
        log::error!("{}: {}", validator.name(), error);
        ValidatorFailure {
            validator: validator.name().to_string(),
            error,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ManifestProvider;
    use crate::resource::{KIND_CONFIG_MAP, KIND_POD};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Stub {
        name: &'static str,
        outcome: Result<usize, ValidatorError>,
        calls: Arc<AtomicUsize>,
    }

    impl Stub {
        fn finding(name: &'static str, count: usize) -> Self {
            Self {
                name,
                outcome: Ok(count),
                calls: Arc::default(),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                outcome: Err(ValidatorError::Other(format!("{} broke", name))),
                calls: Arc::default(),
            }
        }
    }

    impl Validator for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn validate(&self, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let count = self.outcome.clone()?;
            Ok(resources
                .iter()
                .take(count)
                .map(|r| Violation::new(r.reference(), "stub", 1, self.name))
                .collect())
        }
    }

    fn pods(count: usize) -> Vec<Resource> {
        (0..count)
            .map(|i| Resource::new(KIND_POD, format!("pod-{}", i), "shop"))
            .collect()
    }

    fn validation(dir: &TempDir, objects: Vec<Resource>) -> Validation<ManifestProvider> {
        Validation::with_provider(RunOptions::new(dir.path()), ManifestProvider::new(objects))
    }

    #[tokio::test]
    async fn test_collects_violations_in_validator_order() {
        let dir = TempDir::new().unwrap();
        let mut validation = validation(&dir, pods(3));
        let validators: Vec<Box<dyn Validator>> =
            vec![Box::new(Stub::finding("a", 1)), Box::new(Stub::finding("b", 2))];

        let report = validation.validate(&validators).await.unwrap();
        let names: Vec<&str> = report.violations.iter().map(|v| v.validator.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "b"]);
        assert!(report.combined_error().is_none());
        assert_eq!(validation.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_validators() {
        let dir = TempDir::new().unwrap();
        let mut validation = validation(&dir, pods(2));
        let after = Stub::finding("after", 1);
        let after_calls = after.calls.clone();
        let validators: Vec<Box<dyn Validator>> = vec![
            Box::new(Stub::failing("first")),
            Box::new(after),
            Box::new(Stub::failing("last")),
        ];

        let report = validation.validate(&validators).await.unwrap();
        assert_eq!(after_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.violations.len(), 1);

        let combined = report.combined_error().unwrap();
        assert_eq!(combined.0.len(), 2);
        assert_eq!(combined.to_string(), "first: first broke\nlast: last broke");
    }

    #[tokio::test]
    async fn test_parallel_mode_keeps_order() {
        let dir = TempDir::new().unwrap();
        let mut validation = Validation::with_provider(
            RunOptions::new(dir.path()).with_mode(ExecutionMode::Parallel),
            ManifestProvider::new(pods(4)),
        );
        let validators: Vec<Box<dyn Validator>> = vec![
            Box::new(Stub::failing("v0")),
            Box::new(Stub::finding("v1", 1)),
            Box::new(Stub::finding("v2", 1)),
            Box::new(Stub::failing("v3")),
            Box::new(Stub::finding("v4", 1)),
            Box::new(Stub::finding("v5", 1)),
            Box::new(Stub::failing("v6")),
            Box::new(Stub::finding("v7", 1)),
        ];

        let report = validation.validate(&validators).await.unwrap();
        let names: Vec<&str> = report.violations.iter().map(|v| v.validator.as_str()).collect();
        assert_eq!(names, vec!["v1", "v2", "v4", "v5", "v7"]);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.validator.as_str()).collect();
        assert_eq!(failed, vec!["v0", "v3", "v6"]);
    }

    #[tokio::test]
    async fn test_snapshot_is_fetched_once() {
        let dir = TempDir::new().unwrap();
        let mut validation = validation(&dir, pods(2));
        assert_eq!(validation.state(), RunState::Uninitialized);
        assert!(validation.resources().is_none());

        let validators: Vec<Box<dyn Validator>> = vec![Box::new(Stub::finding("a", 5))];
        validation.validate(&validators).await.unwrap();
        assert_eq!(validation.resources().map(<[Resource]>::len), Some(2));

        // Replace the provider's objects: a second run must not see them
        validation.provider = Some(ManifestProvider::new(pods(5)));
        let report = validation.validate(&validators).await.unwrap();
        assert_eq!(report.violations.len(), 2);
    }

    #[tokio::test]
    async fn test_abort_flag_skips_validators() {
        let dir = TempDir::new().unwrap();
        let mut objects = pods(2);
        objects.push(
            Resource::new(KIND_CONFIG_MAP, "landscape-state", "center")
                .with_field("data", json!({"deploying": "true"})),
        );
        let mut validation = validation(&dir, objects);
        let stub = Stub::finding("a", 1);
        let calls = stub.calls.clone();
        let validators: Vec<Box<dyn Validator>> = vec![Box::new(stub)];

        let report = validation.validate(&validators).await.unwrap();
        assert!(report.aborted);
        assert!(report.violations.is_empty());
        assert!(report.combined_error().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(validation.state(), RunState::Aborted);
        assert!(validation.resources().is_none());
    }

    #[tokio::test]
    async fn test_abort_predicate_replaces_flag() {
        let dir = TempDir::new().unwrap();
        let validators: Vec<Box<dyn Validator>> = vec![Box::new(Stub::finding("a", 1))];

        let mut empty = validation(&dir, Vec::new()).with_abort_predicate(|r| r.is_empty());
        assert!(empty.validate(&validators).await.unwrap().aborted);

        let mut populated = validation(&dir, pods(1)).with_abort_predicate(|r| r.is_empty());
        let report = populated.validate(&validators).await.unwrap();
        assert!(!report.aborted);
        assert_eq!(report.violations.len(), 1);
    }

    #[tokio::test]
    async fn test_setup_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut validation: Validation<ManifestProvider> =
            Validation::unconnected(RunOptions::new(dir.path()));
        let stub = Stub::finding("a", 1);
        let calls = stub.calls.clone();
        let validators: Vec<Box<dyn Validator>> = vec![Box::new(stub)];

        let err = validation.validate(&validators).await.unwrap_err();
        assert!(matches!(err, ValidationError::Setup(_)));
        assert_eq!(validation.state(), RunState::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut validation = Validation::with_provider(
            RunOptions::new(dir.path()),
            ManifestProvider::new(pods(1)).unreachable(),
        );
        let err = validation.validate(&[]).await.unwrap_err();
        assert!(matches!(err, ValidationError::Fetch(_)));
        assert_eq!(validation.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_additional_types_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(config::ADDITIONAL_RESOURCE_TYPES_FILE_NAME),
            "group: [broken",
        )
        .unwrap();
        let mut validation = validation(&dir, pods(1));

        let err = validation.validate(&[]).await.unwrap_err();
        assert!(matches!(err, ValidationError::AdditionalResourceTypes(_)));
    }

    #[tokio::test]
    async fn test_additional_types_are_fetched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(config::ADDITIONAL_RESOURCE_TYPES_FILE_NAME),
            "- group: networking.k8s.io\n  version: v1\n  resource: ingresses\n",
        )
        .unwrap();
        let ingress = Resource::new("Ingress", "web", "shop").with_api_version("networking.k8s.io/v1");
        let mut validation = validation(&dir, vec![ingress]);

        validation.validate(&[]).await.unwrap();
        assert_eq!(validation.resources().map(<[Resource]>::len), Some(1));
    }

    struct SlowProvider;

    impl ResourceProvider for SlowProvider {
        async fn list(
            &self,
            _resource_type: &crate::provider::ResourceType,
        ) -> Result<Vec<Resource>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    impl FlagSource for SlowProvider {
        async fn read_flag(
            &self,
            _location: &AbortFlagLocation,
        ) -> Result<Option<String>, ProviderError> {
            Ok(None)
        }
    }

    impl Connect for SlowProvider {
        async fn connect() -> Result<Self, ProviderError> {
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let dir = TempDir::new().unwrap();
        let mut validation: Validation<SlowProvider> = Validation::unconnected(
            RunOptions::new(dir.path()).with_fetch_timeout(Duration::from_millis(20)),
        );

        let err = validation.validate(&[]).await.unwrap_err();
        assert!(matches!(err, ValidationError::FetchTimeout(_)));
        assert_eq!(validation.state(), RunState::Failed);
    }
}
