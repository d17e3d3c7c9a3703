use std::path::PathBuf;
use thiserror::Error;

use crate::provider::ProviderError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum ResourceValidatorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resource provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Validation run failed: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {reason}", .path.display())]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Failed to parse {}: {reason}", .path.display())]
    ParsingFailed { path: PathBuf, reason: String },
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ResourceValidatorError>;
