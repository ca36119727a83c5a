//! Task execution engine.
//!
//! This module provides the graph walker, the executor for each task kind,
//! and the dispatcher that routes tasks between them.

mod build;
mod container;
mod dispatch;
mod executor;
mod mount;
mod plugin;
mod report;
mod shell;
mod walker;

pub use build::{BUILD_TAG_PREFIX, BuildExecutor, build_tag, pack_context};
pub use container::{
    ContainerExecutor, ContainerExitPolicy, PLUGINS_MOUNT, STORE_MOUNT, TRANSIT_MOUNT,
};
pub use dispatch::Dispatcher;
pub use executor::{Executor, Invocation, RunContext, TaskOutput, TaskResult, TaskStatus};
pub use mount::{prepare_mount_source, translate_path};
pub use plugin::{PluginExecutor, resolve_script};
pub use report::{FailureReport, RunReport, WorkflowError};
pub use shell::ShellExecutor;
pub use walker::Walker;
