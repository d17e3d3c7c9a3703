//! # Kubernetes Resource Validator
//!
//! Evaluates a point-in-time snapshot of cluster workload resources against
//! pluggable policy checks and reports the violations found.
//!
//! ## Features
//!
//! - **Pluggable validators**: implement [`validators::Validator`] to add a policy
//! - **Built-in policies**: allowed pods (with ownership-chain resolution),
//!   readiness, freshness and privileged pods
//! - **Abort gate**: a ConfigMap flag, or a custom predicate, can skip a run
//! - **Failure isolation**: a failing validator never stops the others
//! - **Aggregation**: optional post-processing into one finding per resource
//!
//! ## Example
//!
//! ```rust,no_run
//! use kube_resource_validator::{
//!     config,
//!     validation::{RunOptions, Validation},
//!     validators::builtin_validators,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config_dir = config::resolve_config_dir(None);
//! let settings = config::load_settings(&config_dir);
//! let validators = builtin_validators(&config_dir, &settings);
//!
//! let mut validation = Validation::new(RunOptions::from_settings(&config_dir, &settings));
//! let report = validation.validate(&validators).await?;
//! for violation in &report.violations {
//!     println!("{}", violation);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod ownership;
pub mod provider;
pub mod report;
pub mod resource;
pub mod validation;
pub mod validators;

// Re-export commonly used types
pub use aggregate::{EscalatingAggregator, PostProcessor};
pub use error::{ResourceValidatorError, Result};
pub use resource::{Resource, ResourceKey, ResourceRef};
pub use validation::{RunOptions, Validation, ValidationReport};
pub use validators::{Validator, ValidatorError, Violation};

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
