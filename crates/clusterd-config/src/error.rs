//! Typed configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A tunable failed the daemon's validation rules, e.g. an
    /// `offline_threshold` below the supported floor.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}
