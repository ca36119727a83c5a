//! Docker command-line client.

use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{ContainerError, ContainerRuntime, ContainerSpec, RegistryAuth};

/// Drives a docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    /// Use the given client binary.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The client binary.
    pub fn program(&self) -> &str {
        &self.program
    }

    async fn invoke(
        &self,
        operation: &'static str,
        args: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<Output, ContainerError> {
        debug!(program = %self.program, operation, "invoking container runtime");

        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let launch_error = |source| ContainerError::Launch {
            program: self.program.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(launch_error)?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(&input).await.map_err(launch_error)?;
            // close stdin so the client sees EOF
            drop(pipe);
        }

        let output = child.wait_with_output().await.map_err(launch_error)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(ContainerError::Rejected {
                operation,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn invoke_stdout(
        &self,
        operation: &'static str,
        args: &[String],
    ) -> Result<String, ContainerError> {
        let output = self.invoke(operation, args, None).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Command-line arguments for `create`.
pub(crate) fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    if spec.tty {
        args.push("--tty".to_string());
    }
    if let Some(dir) = &spec.working_dir {
        args.push("--workdir".to_string());
        args.push(dir.clone());
    }
    for mount in &spec.mounts {
        args.push("--mount".to_string());
        args.push(format!(
            "type=bind,source={},target={}",
            mount.source, mount.target
        ));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn login(&self, auth: &RegistryAuth) -> Result<(), ContainerError> {
        let mut args = vec![
            "login".to_string(),
            "--username".to_string(),
            auth.username.clone(),
            "--password-stdin".to_string(),
        ];
        if !auth.server.is_empty() {
            args.push(auth.server.clone());
        }
        self.invoke("login", &args, Some(auth.password.clone().into_bytes()))
            .await?;
        Ok(())
    }

    async fn pull(&self, image: &str) -> Result<String, ContainerError> {
        self.invoke_stdout("pull", &["pull".to_string(), image.to_string()])
            .await
    }

    async fn build(&self, context: Vec<u8>, tag: &str) -> Result<String, ContainerError> {
        let args = [
            "build".to_string(),
            "--force-rm".to_string(),
            "--tag".to_string(),
            tag.to_string(),
            "-".to_string(),
        ];
        let output = self.invoke("build", &args, Some(context)).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        let stdout = self.invoke_stdout("create", &create_args(spec)).await?;
        let id = stdout.trim();
        if id.is_empty() {
            return Err(ContainerError::InvalidResponse {
                operation: "create",
                response: stdout,
            });
        }
        Ok(id.to_string())
    }

    async fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.invoke("start", &["start".to_string(), id.to_string()], None)
            .await?;
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i64, ContainerError> {
        let stdout = self
            .invoke_stdout("wait", &["wait".to_string(), id.to_string()])
            .await?;
        stdout
            .trim()
            .parse()
            .map_err(|_| ContainerError::InvalidResponse {
                operation: "wait",
                response: stdout,
            })
    }

    async fn logs(&self, id: &str) -> Result<String, ContainerError> {
        let output = self
            .invoke("logs", &["logs".to_string(), id.to_string()], None)
            .await?;
        let mut logs = String::from_utf8_lossy(&output.stdout).to_string();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    async fn remove(&self, id: &str) -> Result<(), ContainerError> {
        self.invoke(
            "remove",
            &["rm".to_string(), "--force".to_string(), id.to_string()],
            None,
        )
        .await?;
        Ok(())
    }
}
