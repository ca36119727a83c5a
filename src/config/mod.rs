//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for workflows and engine
//! settings.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::EngineConfig;
pub use yaml::YamlLoader;
