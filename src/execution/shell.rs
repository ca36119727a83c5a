//! Local shell executor.
//!
//! Shell tasks run as `sh -c '<command> "$@"' sh <flags...>` in the store
//! directory, so flags reach the command as separate words without any
//! quoting of their values.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::executor::{Executor, Invocation, TaskOutput};
use crate::core::task::TaskError;

/// Runs shell command lines and plugin scripts as child processes.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    /// Use the given POSIX shell.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Run `command_line` through the shell with `args` as positional
    /// parameters appended to it.
    pub async fn run_command_line(
        &self,
        command_line: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<TaskOutput, TaskError> {
        let script = with_positional_args(command_line);
        let mut argv = vec!["-c".to_string(), script, self.shell.clone()];
        argv.extend(args.iter().cloned());

        self.spawn(&self.shell, &argv, working_dir, command_line)
            .await
    }

    /// Run an executable directly.
    pub async fn run_program(
        &self,
        program: &Path,
        args: &[String],
        working_dir: &Path,
    ) -> Result<TaskOutput, TaskError> {
        let shown = program.display().to_string();
        self.spawn(program, args, working_dir, &shown).await
    }

    async fn spawn(
        &self,
        program: impl AsRef<std::ffi::OsStr>,
        args: &[String],
        working_dir: &Path,
        shown: &str,
    ) -> Result<TaskOutput, TaskError> {
        tokio::fs::create_dir_all(working_dir).await?;

        debug!(command = %shown, args = ?args, dir = %working_dir.display(), "spawning process");

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.current_dir(working_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|source| TaskError::LaunchFailed {
            command: shown.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code();

        if output.status.success() {
            Ok(TaskOutput {
                stdout,
                stderr,
                exit_code: code.map(i64::from),
            })
        } else {
            Err(TaskError::CommandFailed { code, stderr })
        }
    }
}

/// Append `"$@"` to the last command of `command_line`.
///
/// Trailing whitespace (the newline of a YAML block scalar) and a trailing
/// `;` are dropped. A trailing `&` stays after the arguments. A `#` comment
/// on the last line still hides the arguments.
fn with_positional_args(command_line: &str) -> String {
    let trimmed = command_line.trim_end();
    if let Some(rest) = trimmed.strip_suffix(';') {
        return format!("{} \"$@\"", rest.trim_end());
    }
    if let Some(rest) = trimmed.strip_suffix('&') {
        if !rest.ends_with('&') {
            return format!("{} \"$@\" &", rest.trim_end());
        }
    }
    format!("{} \"$@\"", trimmed)
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<TaskOutput, TaskError> {
        self.run_command_line(
            &invocation.task.command,
            &invocation.flags(),
            &invocation.context.working_dir,
        )
        .await
    }
}
