//! Container runtime boundary.
//!
//! Container tasks need a handful of operations from a container engine:
//! registry login, image pull and build, and the create/start/wait/logs
//! lifecycle. [`ContainerRuntime`] names exactly those; [`DockerCli`] is the
//! production implementation.

mod docker;

pub use docker::DockerCli;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::arguments::Arguments;
use crate::core::task::TaskError;

/// Global argument naming the registry user.
pub const REGISTRY_USER: &str = "docker-user";
/// Global argument holding the registry password.
pub const REGISTRY_PASSWORD: &str = "docker-password";
/// Global argument naming the registry server.
pub const REGISTRY_SERVER: &str = "docker-server";

/// Argument names consumed by container executors and never forwarded as flags.
pub const CREDENTIAL_ARGUMENTS: [&str; 3] = [REGISTRY_USER, REGISTRY_PASSWORD, REGISTRY_SERVER];

/// Errors reported by a container runtime.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The runtime client could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime rejected an operation.
    #[error("{operation} failed: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// The runtime answered with something unexpected.
    #[error("unexpected {operation} response: {response}")]
    InvalidResponse {
        operation: &'static str,
        response: String,
    },
}

impl From<ContainerError> for TaskError {
    fn from(err: ContainerError) -> Self {
        TaskError::Container(err.to_string())
    }
}

/// Registry credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server: String,
}

impl RegistryAuth {
    /// Credentials from the `docker-*` arguments, if a user is set.
    pub fn from_arguments(arguments: &Arguments) -> Option<Self> {
        let username = arguments.get_str(REGISTRY_USER).unwrap_or_default();
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username: username.to_string(),
            password: arguments
                .get_str(REGISTRY_PASSWORD)
                .unwrap_or_default()
                .to_string(),
            server: arguments
                .get_str(REGISTRY_SERVER)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// A bind mount from a host path into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
}

impl Mount {
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Everything needed to create a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<Mount>,
    pub working_dir: Option<String>,
    pub tty: bool,
}

/// Operations a container engine must provide.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Authenticate against a registry.
    async fn login(&self, auth: &RegistryAuth) -> Result<(), ContainerError>;

    /// Pull an image, returning the pull log.
    async fn pull(&self, image: &str) -> Result<String, ContainerError>;

    /// Build an image from a tar archive of the build context, returning the
    /// build log.
    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<String, ContainerError>;

    /// Create a container, returning its id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError>;

    /// Start a created container.
    async fn start(&self, id: &str) -> Result<(), ContainerError>;

    /// Wait until the container is no longer running, returning its exit code.
    async fn wait(&self, id: &str) -> Result<i64, ContainerError>;

    /// Combined output stream of a container.
    async fn logs(&self, id: &str) -> Result<String, ContainerError>;

    /// Remove a stopped container.
    async fn remove(&self, id: &str) -> Result<(), ContainerError>;
}
