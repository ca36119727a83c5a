//! Task kind → executor routing.

use std::sync::Arc;
use tracing::{Instrument, info_span};

use super::build::BuildExecutor;
use super::container::{ContainerExecutor, ContainerExitPolicy};
use super::executor::{Executor, Invocation, TaskOutput};
use super::plugin::PluginExecutor;
use super::shell::ShellExecutor;
use crate::core::task::{TaskError, TaskKind};
use crate::plugins::PluginRegistry;
use crate::runtime::ContainerRuntime;

/// Holds one executor per task kind.
#[derive(Clone)]
pub struct Dispatcher {
    shell: ShellExecutor,
    container: ContainerExecutor,
    build: BuildExecutor,
    plugin: PluginExecutor,
}

impl Dispatcher {
    pub fn new(
        plugins: Arc<PluginRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        exit_policy: ContainerExitPolicy,
    ) -> Self {
        let shell = ShellExecutor::default();
        let container = ContainerExecutor::new(runtime, exit_policy);
        Self {
            build: BuildExecutor::new(container.clone()),
            plugin: PluginExecutor::new(plugins, shell.clone()),
            shell,
            container,
        }
    }

    /// The executor responsible for `kind`.
    pub fn executor_for(&self, kind: TaskKind) -> &dyn Executor {
        match kind {
            TaskKind::Shell => &self.shell,
            TaskKind::Container => &self.container,
            TaskKind::ContainerFromBuild => &self.build,
            TaskKind::Plugin => &self.plugin,
        }
    }

    /// Run one task on its executor.
    pub async fn dispatch(&self, invocation: &Invocation<'_>) -> Result<TaskOutput, TaskError> {
        let kind = invocation.task.kind;
        let span = info_span!("task_dispatch", task = %invocation.task_id, kind = %kind);
        self.executor_for(kind)
            .execute(invocation)
            .instrument(span)
            .await
    }
}
