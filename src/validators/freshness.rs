//! Freshness check: pods older than a threshold are stale.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{DEFAULT_VIOLATION_LEVEL, Validator, ValidatorError, Violation};
use crate::config::Exemption;
use crate::resource::{self, Resource};

pub const NAME: &str = "built-in:freshness";

pub struct FreshnessValidator {
    threshold: Duration,
    exemption: Exemption,
    now: Option<DateTime<Utc>>,
}

impl FreshnessValidator {
    pub fn new(threshold: Duration, exemption: Exemption) -> Self {
        Self {
            threshold,
            exemption,
            now: None,
        }
    }

    /// Evaluate ages against a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn is_stale(&self, pod: &Resource, now: DateTime<Utc>) -> bool {
        // Synthetic objects have no creation timestamp
        let Some(created) = pod.creation_timestamp() else {
            return false;
        };
        match (now - created).to_std() {
            Ok(elapsed) => elapsed > self.threshold,
            // Created in the future
            Err(_) => false,
        }
    }
}

impl Validator for FreshnessValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorError> {
        let now = self.now.unwrap_or_else(Utc::now);
        let mut violations = Vec::new();

        for pod in resource::pods(resources) {
            if self.exemption.applies_to(pod) {
                log::debug!("Pod {} is exempt", pod.key());
                continue;
            }
            if self.is_stale(pod, now) {
                violations.push(Violation::new(
                    pod.reference(),
                    "Pod is stale",
                    DEFAULT_VIOLATION_LEVEL,
                    NAME,
                ));
            }
        }

        Ok(violations)
    }
}
