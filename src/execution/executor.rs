//! Executor capability and per-task results.
//!
//! Every [`TaskKind`](crate::core::task::TaskKind) maps to one [`Executor`].
//! An executor receives an [`Invocation`]: the task, its name, and the
//! run-wide context (directories, arguments, store).

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::arguments::Arguments;
use crate::core::task::{Task, TaskError};
use crate::core::types::TaskId;
use crate::runtime::CREDENTIAL_ARGUMENTS;
use crate::store::StoreHandle;

/// Run-wide state shared by every vertex of one walk.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Store directory; working directory of shell tasks.
    pub working_dir: PathBuf,
    /// Directory holding plugin scripts and build contexts.
    pub plugin_dir: PathBuf,
    /// Workflow defaults layered with caller-supplied global arguments.
    pub arguments: Arguments,
    /// The evidence store, behind the run's write gate.
    pub store: StoreHandle,
}

/// One task about to be executed.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub task_id: &'a TaskId,
    pub task: &'a Task,
    pub context: &'a RunContext,
}

impl<'a> Invocation<'a> {
    pub fn new(task_id: &'a TaskId, task: &'a Task, context: &'a RunContext) -> Self {
        Self {
            task_id,
            task,
            context,
        }
    }

    /// Run-wide arguments with the task's own arguments layered on top.
    pub fn arguments(&self) -> Arguments {
        self.context.arguments.merged(&self.task.arguments)
    }

    /// Arguments and filter as command-line flags.
    ///
    /// Registry credentials are never rendered.
    pub fn flags(&self) -> Vec<String> {
        flags_from(&self.arguments(), self)
    }
}

pub(crate) fn flags_from(arguments: &Arguments, invocation: &Invocation<'_>) -> Vec<String> {
    let mut flags = arguments.without(&CREDENTIAL_ARGUMENTS).to_command_line();
    flags.extend(invocation.task.filter.to_command_line());
    flags
}

/// What a successful executor produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
}

impl TaskOutput {
    /// Output with no streams, as produced by in-process plugins.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The backend that performs one kind of task.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, invocation: &Invocation<'_>) -> Result<TaskOutput, TaskError>;
}

/// State of a vertex during and after a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting on requirements.
    Pending,
    /// Released; waiting for a concurrency slot or running.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Ran and failed.
    Failed,
    /// Never attempted because a requirement did not succeed.
    Skipped,
}

impl TaskStatus {
    /// Check if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

/// Outcome of one vertex.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Wall time spent executing; zero for skipped tasks.
    pub duration: Duration,
    pub output: Option<TaskOutput>,
    pub error: Option<String>,
    /// The failure came from a misconfigured workflow, not from the work.
    pub misconfigured: bool,
    /// Failed or skipped requirement that caused a skip.
    pub blocked_by: Option<TaskId>,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task_id: TaskId, duration: Duration, output: TaskOutput) -> Self {
        Self {
            task_id,
            status: TaskStatus::Succeeded,
            duration,
            output: Some(output),
            error: None,
            misconfigured: false,
            blocked_by: None,
        }
    }

    /// Create a failed result.
    pub fn failure(task_id: TaskId, duration: Duration, error: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            duration,
            output: None,
            error: Some(error),
            misconfigured: false,
            blocked_by: None,
        }
    }

    /// Create a failed result from an executor error, keeping its class.
    pub fn from_error(task_id: TaskId, duration: Duration, error: &TaskError) -> Self {
        Self {
            misconfigured: error.is_configuration(),
            ..Self::failure(task_id, duration, error.to_string())
        }
    }

    /// Create a skipped result.
    pub fn skipped(task_id: TaskId, blocked_by: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Skipped,
            duration: Duration::ZERO,
            output: None,
            error: None,
            misconfigured: false,
            blocked_by: Some(blocked_by),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::Filter;
    use crate::store::WriteGate;

    fn context(arguments: Arguments) -> RunContext {
        RunContext {
            working_dir: PathBuf::from("/cases/one"),
            plugin_dir: PathBuf::from("/opt/plugins"),
            arguments,
            store: StoreHandle::open("/cases/one", WriteGate::open()),
        }
    }

    #[test]
    fn test_task_arguments_override_run_arguments() {
        let ctx = context(Arguments::new().with("mode", "fast").with("case", "one"));
        let task = Task::shell("true").with_argument("mode", "thorough");
        let id = TaskId::new("t");

        let args = Invocation::new(&id, &task, &ctx).arguments();
        assert_eq!(args.get_str("mode"), Some("thorough"));
        assert_eq!(args.get_str("case"), Some("one"));
    }

    #[test]
    fn test_flags_hide_credentials_and_append_filter() {
        let ctx = context(
            Arguments::new()
                .with("docker-user", "alice")
                .with("docker-password", "hunter2")
                .with("case", "one"),
        );
        let task = Task::shell("true").with_filter(Filter::new().or([("name", "evtx")]));
        let id = TaskId::new("t");

        assert_eq!(
            Invocation::new(&id, &task, &ctx).flags(),
            vec!["--case=one", "--filter=name=evtx"]
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
    }
}
