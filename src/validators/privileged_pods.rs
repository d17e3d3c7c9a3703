//! Privileged pod detection.
//!
//! A pod is flagged when any of its init, regular or ephemeral containers has
//! a security context that:
//!
//! - sets `procMount: Unmasked`
//! - sets `allowPrivilegeEscalation: true`
//! - sets `privileged: true`
//! - adds the `SYS_ADMIN` capability
//!
//! Only the first finding per pod is reported.

use k8s_openapi::api::core::v1::{Container, EphemeralContainer, PodSpec, SecurityContext};
use std::collections::HashSet;

use super::{DEFAULT_VIOLATION_LEVEL, Validator, ValidatorError, Violation};
use crate::config::Exemption;
use crate::resource::{self, Resource, ResourceKey};

pub const NAME: &str = "built-in:privileged-pods";

const UNMASKED_PROC_MOUNT: &str = "Unmasked";
const SYS_ADMIN: &str = "SYS_ADMIN";

pub struct PrivilegedPodsValidator {
    exemption: Exemption,
    pre_approved: HashSet<ResourceKey>,
}

/// The container flavours of a pod spec.
#[derive(Debug, Clone, Copy)]
pub enum ContainerRef<'a> {
    Init(&'a Container),
    Regular(&'a Container),
    Ephemeral(&'a EphemeralContainer),
}

impl<'a> ContainerRef<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Self::Init(c) | Self::Regular(c) => &c.name,
            Self::Ephemeral(c) => &c.name,
        }
    }

    pub fn security_context(&self) -> Option<&'a SecurityContext> {
        match *self {
            Self::Init(c) | Self::Regular(c) => c.security_context.as_ref(),
            Self::Ephemeral(c) => c.security_context.as_ref(),
        }
    }

    fn flavour(&self) -> &'static str {
        match self {
            Self::Init(_) => "init container",
            Self::Regular(_) => "container",
            Self::Ephemeral(_) => "ephemeral container",
        }
    }
}

/// All containers of a pod spec, init containers first.
pub fn containers(spec: &PodSpec) -> impl Iterator<Item = ContainerRef<'_>> {
    let init = spec.init_containers.iter().flatten().map(ContainerRef::Init);
    let regular = spec.containers.iter().map(ContainerRef::Regular);
    let ephemeral = spec
        .ephemeral_containers
        .iter()
        .flatten()
        .map(ContainerRef::Ephemeral);
    init.chain(regular).chain(ephemeral)
}

/// Describe the first privileged setting of a security context, if any.
pub fn privileged_setting(context: &SecurityContext) -> Option<String> {
    if context.proc_mount.as_deref() == Some(UNMASKED_PROC_MOUNT) {
        return Some("procMount is Unmasked".to_string());
    }
    if context.allow_privilege_escalation == Some(true) {
        return Some("allowPrivilegeEscalation is true".to_string());
    }
    if context.privileged == Some(true) {
        return Some("privileged is true".to_string());
    }

    context
        .capabilities
        .as_ref()
        .and_then(|caps| caps.add.as_ref())
        .and_then(|added| {
            added
                .iter()
                .find(|cap| cap.strip_prefix("CAP_").unwrap_or(cap) == SYS_ADMIN)
        })
        .map(|cap| format!("capabilities add {}", cap))
}

impl PrivilegedPodsValidator {
    pub fn new(exemption: Exemption) -> Self {
        Self {
            exemption,
            pre_approved: HashSet::new(),
        }
    }

    /// Pods that may run privileged, matched by (kind, name, namespace).
    pub fn with_pre_approved(mut self, pods: impl IntoIterator<Item = ResourceKey>) -> Self {
        self.pre_approved = pods.into_iter().collect();
        self
    }

    fn finding(&self, pod: &Resource) -> Result<Option<String>, ValidatorError> {
        let Some(raw) = pod.field(&["spec"]) else {
            return Ok(None);
        };
        let spec: PodSpec =
            serde_json::from_value(raw.clone()).map_err(|e| ValidatorError::MalformedResource {
                resource: pod.key().to_string(),
                reason: format!("invalid pod spec: {}", e),
            })?;

        Ok(containers(&spec).find_map(|container| {
            let setting = privileged_setting(container.security_context()?)?;
            Some(format!(
                "{} '{}': {}",
                container.flavour(),
                container.name(),
                setting
            ))
        }))
    }
}

impl Validator for PrivilegedPodsValidator {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, resources: &[Resource]) -> Result<Vec<Violation>, ValidatorError> {
        let mut violations = Vec::new();

        for pod in resource::pods(resources) {
            if self.exemption.applies_to(pod) || self.pre_approved.contains(&pod.key()) {
                log::debug!("Pod {} is exempt", pod.key());
                continue;
            }

            if let Some(reason) = self.finding(pod)? {
                violations.push(Violation::new(
                    pod.reference(),
                    format!("found privileged pod: {}", reason),
                    DEFAULT_VIOLATION_LEVEL,
                    NAME,
                ));
            }
        }

        Ok(violations)
    }
}
