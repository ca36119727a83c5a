//! Built-in plugins.
//!
//! A plugin is an in-process handler invoked by `plugin` tasks whose command
//! names it. The walker receives a [`PluginRegistry`] value; there is no
//! process-wide registry.

mod export_json;
mod import_json;

pub use export_json::ExportJson;
pub use import_json::ImportJson;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::core::arguments::Arguments;
use crate::core::filter::Filter;
use crate::store::{StoreError, StoreHandle};

/// Errors raised by built-in plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A required argument was absent or empty.
    #[error("missing '{0}' in arguments")]
    MissingArgument(&'static str),

    /// Reading or writing a transit file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file did not have the expected shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An in-process task handler.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Short human-readable description.
    fn description(&self) -> &str;

    /// Run against `store` with the task's merged arguments and filter.
    async fn run(
        &self,
        store: &StoreHandle,
        arguments: &Arguments,
        filter: &Filter,
    ) -> Result<(), PluginError>;
}

/// Name → plugin mapping consulted by `plugin` tasks.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `import-json` and `export-json`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("import-json", Arc::new(ImportJson));
        registry.register("export-json", Arc::new(ExportJson));
        registry
    }

    /// Register a plugin, returning any plugin it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        plugin: Arc<dyn Plugin>,
    ) -> Option<Arc<dyn Plugin>> {
        self.plugins.insert(name.into(), plugin)
    }

    /// Look up a plugin by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Plugin names and descriptions in name order.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.plugins
            .iter()
            .map(|(name, plugin)| (name.as_str(), plugin.description()))
            .collect()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

/// Fetch a non-empty string argument.
pub(crate) fn required<'a>(
    arguments: &'a Arguments,
    name: &'static str,
) -> Result<&'a str, PluginError> {
    arguments
        .get_str(name)
        .filter(|value| !value.is_empty())
        .ok_or(PluginError::MissingArgument(name))
}
