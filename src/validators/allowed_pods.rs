//! Allowed-pods check.
//!
//! A pod is compliant when it, or any of its owners, is listed in
//! `allowlist.yaml`, or when it carries the exemption label.

use std::collections::HashSet;
use std::path::Path;

use super::{DEFAULT_VIOLATION_LEVEL, Validator, ValidatorError, Violation};
use crate::config::{self, ALLOWLIST_FILE_NAME, Exemption, ListEntry};
use crate::ownership::OwnershipResolver;
use crate::resource::{self, Resource, ResourceKey};

pub const NAME: &str = "built-in:allowed-pods";

/// Flags pods that are neither allowlisted nor owned by an allowlisted resource.
pub struct AllowedPodsValidator {
    allowlist: Result<HashSet<ResourceKey>, ValidatorError>,
    exemption: Exemption,
}

impl AllowedPodsValidator {
    pub fn new(entries: &[ListEntry], exemption: Exemption) -> Self {
        Self {
            allowlist: Ok(entries.iter().map(ResourceKey::from).collect()),
            exemption,
        }
    }

    /// Load `allowlist.yaml` from the config directory.
    ///
    /// A load failure does not fail construction; it is reported by every
    /// `validate` call instead.
    pub fn from_config_dir(config_dir: &Path, exemption: Exemption) -> Self {
        let allowlist = config::read_entry_list(&config_dir.join(ALLOWLIST_FILE_NAME))
            .map(|entries| entries.iter().map(ResourceKey::from).collect())
            .map_err(ValidatorError::from);

        if let Err(e) = &allowlist {
            log::warn!("Allowed-pods validator: {}", e);
        }

        Self {
            allowlist,
            exemption,
        }
    }
}

impl Validator for AllowedPodsValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorError> {
        let allowlist = self.allowlist.as_ref().map_err(Clone::clone)?;
        let resolver = OwnershipResolver::new(resources);
        let mut violations = Vec::new();

        for pod in resource::pods(resources) {
            if self.exemption.applies_to(pod) {
                log::debug!("Pod {} is exempt", pod.key());
                continue;
            }

            match resolver.resolve(&pod.key(), allowlist) {
                Some(resolution) => {
                    log::debug!(
                        "Pod {} is allowlisted through {} (depth {})",
                        pod.key(),
                        resolution.matched,
                        resolution.depth
                    );
                }
                None => violations.push(Violation::new(
                    pod.reference(),
                    "NOT found in allowlist",
                    DEFAULT_VIOLATION_LEVEL,
                    NAME,
                )),
            }
        }

        Ok(violations)
    }
}
