//! Engine configuration (`casework.yaml`).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::arguments::Arguments;
use crate::execution::{ContainerExitPolicy, Walker};
use crate::plugins::PluginRegistry;
use crate::runtime::DockerCli;
use crate::store::StoreAccess;

/// Settings for running workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of tasks executing at once; unbounded if unset.
    pub max_concurrent_tasks: Option<usize>,
    /// How concurrently running tasks share the store.
    pub store_access: StoreAccess,
    /// Container client binary; `docker` if unset.
    pub container_runtime: Option<String>,
    /// Treatment of non-zero container exit codes.
    pub container_exit: ContainerExitPolicy,
    /// Global arguments, such as registry credentials.
    #[serde(alias = "with")]
    pub arguments: Arguments,
}

impl EngineConfig {
    /// Client binary used for container tasks.
    pub fn container_runtime(&self) -> &str {
        self.container_runtime.as_deref().unwrap_or("docker")
    }

    /// A walker configured from these settings.
    pub fn walker(&self, plugins: PluginRegistry) -> Walker {
        let walker = Walker::new(plugins)
            .with_runtime(Arc::new(DockerCli::new(self.container_runtime())))
            .with_store_access(self.store_access)
            .with_container_exit(self.container_exit);

        match self.max_concurrent_tasks {
            Some(max) => walker.with_max_concurrency(max),
            None => walker,
        }
    }
}
