//! Readiness check.
//!
//! Every resource listed in `readinesslist.yaml` must be present in the
//! snapshot and report itself ready, either through a `Ready` condition with
//! status `True` or through a boolean `status.ready` field. Resources carrying
//! the exemption label are skipped.

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use super::{DEFAULT_VIOLATION_LEVEL, Validator, ValidatorError, Violation};
use crate::config::{self, Exemption, ListEntry, READINESS_LIST_FILE_NAME};
use crate::resource::{self, Resource};

pub const NAME: &str = "built-in:readiness";

const READY_CONDITION: &str = "Ready";
const CONDITION_TRUE: &str = "True";

/// Checks that listed resources exist and are ready.
pub struct ReadinessValidator {
    entries: Result<Vec<ListEntry>, ValidatorError>,
    ignore_missing: bool,
    exemption: Exemption,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(rename = "type")]
    condition_type: String,
    #[serde(default)]
    status: String,
}

impl ReadinessValidator {
    pub fn new(entries: Vec<ListEntry>, ignore_missing: bool, exemption: Exemption) -> Self {
        Self {
            entries: Ok(entries),
            ignore_missing,
            exemption,
        }
    }

    /// Load `readinesslist.yaml` from the config directory.
    pub fn from_config_dir(config_dir: &Path, ignore_missing: bool, exemption: Exemption) -> Self {
        let entries = config::read_entry_list(&config_dir.join(READINESS_LIST_FILE_NAME))
            .map_err(ValidatorError::from);

        if let Err(e) = &entries {
            log::warn!("Readiness validator: {}", e);
        }

        Self {
            entries,
            ignore_missing,
            exemption,
        }
    }
}

impl Validator for ReadinessValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorError> {
        let entries = self.entries.as_ref().map_err(Clone::clone)?;
        let mut violations = Vec::new();

        for entry in entries {
            let Some(found) = resource::find(resources, &entry.key()) else {
                if self.ignore_missing {
                    log::debug!("Ignoring missing resource {}", entry.key());
                } else {
                    let missing = Resource::new(&entry.kind, &entry.name, &entry.namespace);
                    violations.push(Violation::new(
                        missing.reference(),
                        "readiness violation: resource not found",
                        DEFAULT_VIOLATION_LEVEL,
                        NAME,
                    ));
                }
                continue;
            };

            if self.exemption.applies_to(found) {
                log::debug!("{} is exempt", found.key());
                continue;
            }

            match is_ready(found) {
                Ok(true) => log::debug!("{} is ready", found.key()),
                Ok(false) => violations.push(Violation::new(
                    found.reference(),
                    "readiness violation",
                    DEFAULT_VIOLATION_LEVEL,
                    NAME,
                )),
                Err(e) => log::warn!("Skipping readiness of {}: {}", found.key(), e),
            }
        }

        Ok(violations)
    }
}

/// Whether the resource reports itself ready.
///
/// Fails when `status.conditions` is present but not a list of conditions.
pub fn is_ready(resource: &Resource) -> Result<bool, ValidatorError> {
    if let Some(raw) = resource.field(&["status", "conditions"]) {
        let conditions: Vec<Condition> =
            serde_json::from_value(raw.clone()).map_err(|e| ValidatorError::MalformedResource {
                resource: resource.key().to_string(),
                reason: format!("invalid status.conditions: {}", e),
            })?;

        let ready_condition = conditions
            .iter()
            .any(|c| c.condition_type == READY_CONDITION && c.status == CONDITION_TRUE);
        if ready_condition {
            return Ok(true);
        }
    }

    Ok(resource
        .field(&["status", "ready"])
        .and_then(Value::as_bool)
        .unwrap_or(false))
}
