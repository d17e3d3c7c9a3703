//! Policy checks.
//!
//! Every check implements [`Validator`]: it receives the immutable snapshot of
//! one run and returns the violations it found, or an error when it could not
//! evaluate the snapshot at all. The trait is the extension point for custom
//! policies; the built-ins live in the submodules.

pub mod allowed_pods;
pub mod freshness;
pub mod privileged_pods;
pub mod readiness;

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::resource::{Resource, ResourceRef};

pub use crate::config::Exemption;
pub use allowed_pods::AllowedPodsValidator;
pub use freshness::FreshnessValidator;
pub use privileged_pods::PrivilegedPodsValidator;
pub use readiness::ReadinessValidator;

/// Severity of a violation raised by the built-in validators.
pub const DEFAULT_VIOLATION_LEVEL: u32 = 1;

/// Most severe violation level.
pub const MOST_SEVERE_LEVEL: u32 = 0;

/// A policy check over a resource snapshot.
pub trait Validator: Send + Sync {
    /// Stable identifier used for log attribution and aggregation.
    fn name(&self) -> &str;

    /// Evaluate the snapshot.
    ///
    /// `Ok` with no violations means the snapshot complies. `Err` means the
    /// result of this validator is void for the run.
    fn validate(&self, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorError>;
}

/// A policy finding against one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub target: ResourceRef,
    pub message: String,
    /// 0 is the most severe level.
    pub level: u32,
    pub validator: String,
}

impl Violation {
    pub fn new(
        target: ResourceRef,
        message: impl Into<String>,
        level: u32,
        validator: impl Into<String>,
    ) -> Self {
        Self {
            target,
            message: message.into(),
            level,
            validator: validator.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} (level {})",
            self.validator, self.target, self.message, self.level
        )
    }
}

/// Reasons a validator could not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidatorError {
    #[error("cannot load {}: {reason}", .path.display())]
    ConfigUnavailable { path: PathBuf, reason: String },

    #[error("cannot evaluate {resource}: {reason}")]
    MalformedResource { resource: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl From<ConfigError> for ValidatorError {
    fn from(error: ConfigError) -> Self {
        let path = match &error {
            ConfigError::NotFound(path) => path.clone(),
            ConfigError::ReadFailed { path, .. } | ConfigError::ParsingFailed { path, .. } => {
                path.clone()
            }
        };
        Self::ConfigUnavailable {
            path,
            reason: error.to_string(),
        }
    }
}

/// The built-in validators, configured from the config directory.
pub fn builtin_validators(
    config_dir: &std::path::Path,
    settings: &crate::config::Settings,
) -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(AllowedPodsValidator::from_config_dir(
            config_dir,
            settings.exempt.clone(),
        )),
        Box::new(ReadinessValidator::from_config_dir(
            config_dir,
            settings.readiness.ignore_missing_resources,
            settings.exempt.clone(),
        )),
        Box::new(FreshnessValidator::new(
            settings.freshness.threshold(),
            settings.exempt.clone(),
        )),
        Box::new(PrivilegedPodsValidator::new(settings.exempt.clone())),
    ]
}
