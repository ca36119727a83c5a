//! Container executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::executor::{Executor, Invocation, TaskOutput, flags_from};
use super::mount::prepare_mount_source;
use crate::core::task::TaskError;
use crate::runtime::{ContainerRuntime, ContainerSpec, Mount, RegistryAuth};

/// In-container location of the store directory.
pub const STORE_MOUNT: &str = "/store";
/// In-container location of the plugin directory.
pub const PLUGINS_MOUNT: &str = "/plugins";
/// In-container location of the directory holding a task's `file` argument.
pub const TRANSIT_MOUNT: &str = "/transit";

/// How a non-zero in-container exit code is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerExitPolicy {
    /// Non-zero exit fails the task.
    #[default]
    Enforce,
    /// Any container that ran to completion counts as a success.
    Ignore,
}

impl std::str::FromStr for ContainerExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enforce" => Ok(ContainerExitPolicy::Enforce),
            "ignore" => Ok(ContainerExitPolicy::Ignore),
            other => Err(format!("unknown container exit policy '{}'", other)),
        }
    }
}

/// Runs tasks inside containers.
#[derive(Clone)]
pub struct ContainerExecutor {
    runtime: Arc<dyn ContainerRuntime>,
    exit_policy: ContainerExitPolicy,
}

impl ContainerExecutor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, exit_policy: ContainerExitPolicy) -> Self {
        Self {
            runtime,
            exit_policy,
        }
    }

    /// The runtime this executor drives.
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Run the invocation's command in a container from `image`.
    ///
    /// `pull` is false for images that were just built locally; registry
    /// login only happens ahead of a pull.
    pub async fn run_image(
        &self,
        invocation: &Invocation<'_>,
        image: &str,
        pull: bool,
    ) -> Result<TaskOutput, TaskError> {
        let mut arguments = invocation.arguments();

        if pull {
            if let Some(auth) = RegistryAuth::from_arguments(&arguments) {
                self.runtime.login(&auth).await?;
            }
            let log = self.runtime.pull(image).await?;
            debug!(image, log = %log.trim(), "pulled image");
        }

        let ctx = invocation.context;
        let mut mounts = vec![
            Mount::bind(prepare_mount_source(&ctx.working_dir).await?, STORE_MOUNT),
            Mount::bind(prepare_mount_source(&ctx.plugin_dir).await?, PLUGINS_MOUNT),
        ];

        if let Some(file) = arguments
            .get_str("file")
            .filter(|f| !f.is_empty())
            .map(str::to_string)
        {
            let (dir, name) = split_transit(&file);
            mounts.push(Mount::bind(prepare_mount_source(dir).await?, TRANSIT_MOUNT));
            arguments.insert("file", name);
        }

        let mut command: Vec<String> = invocation
            .task
            .command
            .split_whitespace()
            .map(str::to_string)
            .collect();
        command.extend(flags_from(&arguments, invocation));

        let spec = ContainerSpec {
            image: image.to_string(),
            command,
            mounts,
            working_dir: Some(STORE_MOUNT.to_string()),
            tty: true,
        };
        debug!(task = %invocation.task_id, image, command = ?spec.command, "creating container");

        let id = self.runtime.create(&spec).await?;
        let outcome = self.run_container(&id).await;

        if let Err(e) = self.runtime.remove(&id).await {
            warn!(container = %id, error = %e, "failed to remove container");
        }

        let (code, logs) = outcome?;
        if code != 0 && self.exit_policy == ContainerExitPolicy::Enforce {
            return Err(TaskError::ContainerExited { code, logs });
        }

        Ok(TaskOutput {
            stdout: logs,
            stderr: String::new(),
            exit_code: Some(code),
        })
    }

    async fn run_container(&self, id: &str) -> Result<(i64, String), TaskError> {
        self.runtime.start(id).await?;
        let code = self.runtime.wait(id).await?;
        let logs = self.runtime.logs(id).await?;
        Ok((code, logs))
    }
}

/// Split a transit file path into its directory and base name.
fn split_transit(file: &str) -> (&Path, String) {
    let path = Path::new(file);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    (dir, name)
}

#[async_trait]
impl Executor for ContainerExecutor {
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<TaskOutput, TaskError> {
        let image = invocation
            .task
            .image
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| TaskError::Container("task has no image".to_string()))?;
        self.run_image(invocation, image, true).await
    }
}
