//! Abort gate.
//!
//! Decides once per run whether validation proceeds. By default a single
//! ConfigMap field is consulted: the literal value `true` aborts, anything
//! else (including a missing ConfigMap, a missing field or an unreachable
//! flag source) proceeds. A caller-supplied predicate replaces the lookup
//! entirely.

use std::fmt;
use std::time::Duration;

use crate::config::AbortFlagLocation;
use crate::provider::FlagSource;
use crate::resource::Resource;

/// Flag value that aborts the run.
pub const ABORT_VALUE: &str = "true";

/// Custom abort decision over the fetched snapshot.
pub type AbortPredicate = Box<dyn Fn(&[Resource]) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortDecision {
    Proceed,
    Abort,
}

impl AbortDecision {
    pub fn is_abort(self) -> bool {
        self == Self::Abort
    }
}

pub enum AbortGate {
    Flag(AbortFlagLocation),
    Predicate(AbortPredicate),
}

impl fmt::Debug for AbortGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(location) => f.debug_tuple("Flag").field(location).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl Default for AbortGate {
    fn default() -> Self {
        Self::Flag(AbortFlagLocation::default())
    }
}

impl AbortGate {
    pub fn predicate(predicate: impl Fn(&[Resource]) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Box::new(predicate))
    }

    /// Evaluate the gate.
    ///
    /// `deadline` bounds the flag lookup; a lookup that does not finish in
    /// time counts as unreachable.
    pub async fn evaluate<F: FlagSource>(
        &self,
        source: &F,
        resources: &[Resource],
        deadline: Option<Duration>,
    ) -> AbortDecision {
        let location = match self {
            Self::Predicate(predicate) => {
                return if predicate(resources) {
                    log::info!("Custom abort predicate requested abort");
                    AbortDecision::Abort
                } else {
                    AbortDecision::Proceed
                };
            }
            Self::Flag(location) => location,
        };

        let lookup = source.read_flag(location);
        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, lookup).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!(
                        "Abort flag lookup timed out after {:?}; proceeding with validation",
                        limit
                    );
                    return AbortDecision::Proceed;
                }
            },
            None => lookup.await,
        };

        match result {
            Ok(Some(value)) if value == ABORT_VALUE => {
                log::info!(
                    "Field {} of {}/{} is {}, aborting validation",
                    location.config_map_field,
                    location.config_map_namespace,
                    location.config_map_name,
                    value
                );
                AbortDecision::Abort
            }
            Ok(Some(value)) => {
                log::debug!(
                    "Field {} of {}/{} is {}, not aborting validation",
                    location.config_map_field,
                    location.config_map_namespace,
                    location.config_map_name,
                    value
                );
                AbortDecision::Proceed
            }
            Ok(None) => {
                log::debug!(
                    "Abort flag {}/{}:{} not set, not aborting validation",
                    location.config_map_namespace,
                    location.config_map_name,
                    location.config_map_field
                );
                AbortDecision::Proceed
            }
            Err(e) => {
                log::warn!("{}; proceeding with validation", e);
                AbortDecision::Proceed
            }
        }
    }
}
