//! Error types for configuration loading.

use thiserror::Error;

/// Errors raised while loading or validating the audit configuration.
///
/// These are fatal at setup time; nothing else in the pipeline surfaces
/// errors to callers.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
