//! casework - a small workflow engine for analysis tasks.
//!
//! A workflow is a named set of tasks with `requires` edges. The [`Walker`]
//! runs each task as soon as its requirements have succeeded, dispatching it
//! as a shell command, a container, a container built from a plugin
//! directory, or a plugin, all against one evidence store.

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod plugins;
pub mod runtime;
pub mod store;
pub mod testing;

pub use config::{ConfigError, EngineConfig, YamlLoader};
pub use core::arguments::Arguments;
pub use core::dag::{Graph, GraphError};
pub use core::filter::{Filter, Record};
pub use core::task::{Task, TaskError, TaskKind};
pub use core::types::{RunId, TaskId};
pub use core::workflow::Workflow;
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    ContainerExitPolicy, FailureReport, RunReport, TaskResult, TaskStatus, Walker, WorkflowError,
};
pub use plugins::{Plugin, PluginError, PluginRegistry};
pub use runtime::{ContainerRuntime, DockerCli};
pub use store::{EvidenceStore, InMemoryStore, JsonLinesStore, StoreAccess, StoreHandle};
