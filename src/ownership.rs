//! Ownership-tree resolution.
//!
//! Decides whether a resource is covered by an allowlist either directly or
//! through any ancestor reachable by following owner references. The walk is
//! confined to the snapshot: an owner that is not part of it is still matched
//! against the allowlist, but its own owners are unknown.
//!
//! Owner references come from cluster data and may be malformed, so the walk
//! keeps a visited set and stops on cycles instead of recursing forever.

use crate::resource::{Resource, ResourceKey};
use std::collections::{HashMap, HashSet};

/// How a resource was found to be allowlisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The allowlisted identity that matched.
    pub matched: ResourceKey,
    /// Number of owner hops from the target; 0 is a direct match.
    pub depth: usize,
}

/// Owner-reference index over one snapshot.
pub struct OwnershipResolver<'a> {
    index: HashMap<ResourceKey, &'a Resource>,
}

impl<'a> OwnershipResolver<'a> {
    pub fn new(resources: &'a [Resource]) -> Self {
        let mut index = HashMap::with_capacity(resources.len());
        for resource in resources {
            // First occurrence wins if the snapshot repeats an identity
            index.entry(resource.key()).or_insert(resource);
        }
        Self { index }
    }

    /// Resolve `target` against the allowlist.
    ///
    /// Candidates are visited depth-first in owner-reference order, so the
    /// first match is the one the reference-order recursion would find.
    pub fn resolve(
        &self,
        target: &ResourceKey,
        allowlist: &HashSet<ResourceKey>,
    ) -> Option<Resolution> {
        let mut visited: HashSet<ResourceKey> = HashSet::new();
        let mut stack: Vec<(ResourceKey, usize)> = vec![(target.clone(), 0)];

        while let Some((candidate, depth)) = stack.pop() {
            if !visited.insert(candidate.clone()) {
                log::debug!("Owner reference cycle at {}", candidate);
                continue;
            }

            if allowlist.contains(&candidate) {
                return Some(Resolution {
                    matched: candidate,
                    depth,
                });
            }

            let Some(resource) = self.index.get(&candidate) else {
                continue;
            };
            // Reversed so the first owner is popped first
            for owner in resource.owner_references().iter().rev() {
                stack.push((candidate.owner(owner), depth + 1));
            }
        }

        None
    }

    pub fn is_allowed(&self, target: &ResourceKey, allowlist: &HashSet<ResourceKey>) -> bool {
        self.resolve(target, allowlist).is_some()
    }

    /// All distinct ancestors of `target` found in the snapshot or named by an
    /// owner reference, in visiting order.
    pub fn ancestors(&self, target: &ResourceKey) -> Vec<ResourceKey> {
        let mut visited: HashSet<ResourceKey> = HashSet::from([target.clone()]);
        let mut order = Vec::new();
        let mut stack = vec![target.clone()];

        while let Some(candidate) = stack.pop() {
            let Some(resource) = self.index.get(&candidate) else {
                continue;
            };
            for owner in resource.owner_references().iter().rev() {
                let owner_key = candidate.owner(owner);
                if visited.insert(owner_key.clone()) {
                    order.push(owner_key.clone());
                    stack.push(owner_key);
                }
            }
        }

        order
    }
}
