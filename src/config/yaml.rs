//! YAML configuration parsing.
//!
//! Parses workflow documents and engine configuration. A workflow document
//! is either wrapped:
//!
//! ```yaml
//! arguments:
//!   docker-server: registry.example.com
//! tasks:
//!   import:
//!     type: plugin
//!     command: import-json
//! ```
//!
//! or a bare mapping of task name to task.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

use super::error::ConfigError;
use super::types::EngineConfig;
use crate::core::arguments::Arguments;
use crate::core::task::Task;
use crate::core::types::TaskId;
use crate::core::workflow::Workflow;

const WRAPPER_KEYS: [&str; 3] = ["tasks", "arguments", "with"];

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load engine configuration from a file.
    pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
        let path = path.as_ref();
        let content = read(path)?;
        Self::parse_engine_config(&content).map_err(|e| with_path(e, path))
    }

    /// Parse engine configuration from a YAML string.
    pub fn parse_engine_config(yaml: &str) -> Result<EngineConfig, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        if config.max_concurrent_tasks == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "max_concurrent_tasks cannot be zero".into(),
            ));
        }
        Ok(config)
    }

    /// Load a workflow from a file.
    pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, ConfigError> {
        let path = path.as_ref();
        let content = read(path)?;
        Self::parse_workflow(&content).map_err(|e| with_path(e, path))
    }

    /// Parse a workflow from a YAML string.
    ///
    /// Checks that every task has the fields its type needs. The dependency
    /// graph is not validated here; see [`YamlLoader::validate_workflow`].
    pub fn parse_workflow(yaml: &str) -> Result<Workflow, ConfigError> {
        let document: Value = serde_yaml::from_str(yaml)?;

        let workflow = match document {
            Value::Null => Workflow::new(),
            Value::Mapping(mut mapping) if is_wrapped(&mapping) => {
                if mapping.get("tasks").is_some_and(Value::is_null) {
                    mapping.remove("tasks");
                }
                serde_yaml::from_value(Value::Mapping(mapping))?
            }
            Value::Mapping(mapping) => {
                let tasks: BTreeMap<TaskId, Task> =
                    serde_yaml::from_value(Value::Mapping(mapping))?;
                Workflow {
                    tasks,
                    arguments: Arguments::new(),
                }
            }
            _ => {
                return Err(ConfigError::InvalidConfig(
                    "workflow must be a mapping".into(),
                ));
            }
        };

        Self::validate_tasks(&workflow)?;
        Ok(workflow)
    }

    /// Full validation: task fields and the dependency graph.
    pub fn validate_workflow(workflow: &Workflow) -> Result<(), ConfigError> {
        Self::validate_tasks(workflow)?;
        workflow.graph()?;
        Ok(())
    }

    fn validate_tasks(workflow: &Workflow) -> Result<(), ConfigError> {
        for (name, task) in &workflow.tasks {
            if name.as_str().trim().is_empty() {
                return Err(ConfigError::InvalidConfig("task name cannot be empty".into()));
            }
            if let Some(field) = task.missing_field() {
                return Err(ConfigError::MissingField {
                    task: name.clone(),
                    field,
                });
            }
        }
        Ok(())
    }
}

/// The wrapped form has only wrapper keys, including `tasks`, and `tasks`
/// is not itself a task definition.
fn is_wrapped(mapping: &Mapping) -> bool {
    let keys_are_wrapper = mapping
        .keys()
        .all(|k| k.as_str().is_some_and(|k| WRAPPER_KEYS.contains(&k)));

    let tasks_is_collection = match mapping.get("tasks") {
        Some(Value::Mapping(inner)) => !inner.get("type").is_some_and(Value::is_string),
        Some(Value::Null) => true,
        _ => false,
    };

    keys_are_wrapper && tasks_is_collection
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
        path: path.to_path_buf(),
        source,
    })
}

fn with_path(err: ConfigError, path: &Path) -> ConfigError {
    match err {
        ConfigError::YamlError(source) => ConfigError::YamlFileError {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}
