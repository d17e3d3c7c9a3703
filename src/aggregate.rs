//! Post-processing of a run's violations.
//!
//! The orchestrator returns every violation as produced. Callers that want a
//! single finding per resource plug a [`PostProcessor`] in after the run; the
//! stock [`EscalatingAggregator`] merges corroborated findings into one
//! escalated violation and drops uncorroborated privileged-pod findings.

use std::collections::HashMap;

use crate::resource::ResourceRef;
use crate::validators::{MOST_SEVERE_LEVEL, Violation, privileged_pods};

pub const AGGREGATED_MESSAGE: &str = "aggregated violation";

/// A stage applied to the violations of a completed run.
pub trait PostProcessor {
    fn process(&self, violations: Vec<Violation>) -> Vec<Violation>;
}

/// Identity of a violation target: kind, name, namespace and API group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TargetKey {
    kind: String,
    name: String,
    namespace: String,
    group: String,
}

impl From<&ResourceRef> for TargetKey {
    fn from(target: &ResourceRef) -> Self {
        Self {
            kind: target.kind.clone(),
            name: target.name.clone(),
            namespace: target.namespace.clone(),
            group: target.group().to_string(),
        }
    }
}

/// Group violations by target, keeping groups and their members in
/// first-encounter order.
pub fn group_by_target(violations: Vec<Violation>) -> Vec<Vec<Violation>> {
    let mut positions: HashMap<TargetKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<Violation>> = Vec::new();

    for violation in violations {
        let key = TargetKey::from(&violation.target);
        match positions.get(&key) {
            Some(&index) => groups[index].push(violation),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![violation]);
            }
        }
    }

    groups
}

/// One violation per resource:
///
/// - a single violation passes through, unless it comes from a validator in
///   the suppressed set (by default only privileged-pods)
/// - several violations become one with the most severe level, the
///   contributing validator names joined by `+` and a fixed message
#[derive(Debug, Clone)]
pub struct EscalatingAggregator {
    suppressed_when_alone: Vec<String>,
}

impl Default for EscalatingAggregator {
    fn default() -> Self {
        Self {
            suppressed_when_alone: vec![privileged_pods::NAME.to_string()],
        }
    }
}

impl EscalatingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validators whose findings are dropped unless corroborated.
    pub fn with_suppressed_when_alone(mut self, validators: Vec<String>) -> Self {
        self.suppressed_when_alone = validators;
        self
    }

    fn escalate(&self, group: Vec<Violation>) -> Option<Violation> {
        let mut members = group.into_iter();
        let first = members.next()?;
        let rest: Vec<Violation> = members.collect();

        if rest.is_empty() {
            if self.suppressed_when_alone.contains(&first.validator) {
                log::debug!(
                    "Suppressing uncorroborated {} violation for {}",
                    first.validator,
                    first.target
                );
                return None;
            }
            return Some(first);
        }

        let validator = std::iter::once(first.validator.as_str())
            .chain(rest.iter().map(|v| v.validator.as_str()))
            .collect::<Vec<_>>()
            .join("+");

        Some(Violation::new(
            first.target,
            AGGREGATED_MESSAGE,
            MOST_SEVERE_LEVEL,
            validator,
        ))
    }
}

impl PostProcessor for EscalatingAggregator {
    fn process(&self, violations: Vec<Violation>) -> Vec<Violation> {
        group_by_target(violations)
            .into_iter()
            .filter_map(|group| self.escalate(group))
            .collect()
    }
}
