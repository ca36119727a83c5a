//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::dag::GraphError;
use crate::core::types::TaskId;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse YAML from a specific file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A task lacks a field its type requires.
    #[error("task '{task}' is missing required field '{field}'")]
    MissingField { task: TaskId, field: &'static str },

    /// The task graph is invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),
}
