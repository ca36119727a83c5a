//! Workflow definition.
//!
//! A workflow is a set of named tasks plus workflow-wide default arguments.
//! The dependency graph is derived from it on demand and never stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::arguments::Arguments;
use super::dag::{Graph, GraphError};
use super::task::Task;
use super::types::TaskId;

/// A named set of tasks and their shared arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Tasks keyed by name.
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, Task>,

    /// Defaults applied to every task's executor context.
    #[serde(default, alias = "with", skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a task under `name`, replacing any task of the same name.
    pub fn task(mut self, name: impl Into<TaskId>, task: Task) -> Self {
        self.tasks.insert(name.into(), task);
        self
    }

    /// Builder: set a workflow-wide argument.
    pub fn argument(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(name, value);
        self
    }

    /// Get a task by name.
    pub fn get(&self, name: &TaskId) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the workflow has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Derive and validate the dependency graph.
    pub fn graph(&self) -> Result<Graph, GraphError> {
        Graph::build(&self.tasks)
    }

    /// Task names in an order that respects every `requires` edge.
    pub fn execution_order(&self) -> Result<Vec<TaskId>, GraphError> {
        self.graph()?.topological_order()
    }
}
