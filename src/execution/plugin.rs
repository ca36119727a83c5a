//! Plugin executor: built-in handlers first, then plugin-directory scripts.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::executor::{Executor, Invocation, TaskOutput};
use super::shell::ShellExecutor;
use crate::core::task::TaskError;
use crate::plugins::PluginRegistry;

/// Dispatches `plugin` tasks.
#[derive(Clone)]
pub struct PluginExecutor {
    registry: Arc<PluginRegistry>,
    shell: ShellExecutor,
}

impl PluginExecutor {
    pub fn new(registry: Arc<PluginRegistry>, shell: ShellExecutor) -> Self {
        Self { registry, shell }
    }
}

/// Locate `name` in `plugin_dir`, also trying a `.exe` suffix.
///
/// Returns `Ok(None)` if neither exists.
pub async fn resolve_script(plugin_dir: &Path, name: &str) -> Result<Option<PathBuf>, TaskError> {
    let bare = plugin_dir.join(name);
    let exe = plugin_dir.join(format!("{}.exe", name));

    for candidate in [bare, exe] {
        match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_dir() => return Err(TaskError::ScriptIsDirectory(candidate)),
            Ok(_) => return Ok(Some(candidate)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(TaskError::Io(e)),
        }
    }
    Ok(None)
}

#[async_trait]
impl Executor for PluginExecutor {
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<TaskOutput, TaskError> {
        let command = invocation.task.command.trim();

        if let Some(plugin) = self.registry.get(command) {
            debug!(task = %invocation.task_id, plugin = command, "running built-in plugin");
            plugin
                .run(
                    &invocation.context.store,
                    &invocation.arguments(),
                    &invocation.task.filter,
                )
                .await
                .map_err(|e| TaskError::Plugin(e.to_string()))?;
            return Ok(TaskOutput::empty());
        }

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        if name.is_empty() {
            return Err(TaskError::PluginNotFound(command.to_string()));
        }

        let script = resolve_script(&invocation.context.plugin_dir, name)
            .await?
            .ok_or_else(|| TaskError::PluginNotFound(command.to_string()))?;

        let mut args: Vec<String> = words.map(str::to_string).collect();
        args.extend(invocation.flags());

        debug!(task = %invocation.task_id, script = %script.display(), "running plugin script");
        self.shell
            .run_program(&script, &args, &invocation.context.working_dir)
            .await
    }
}
