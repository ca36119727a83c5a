//! Task descriptors and per-task errors.
//!
//! A [`Task`] is the declarative form of one unit of work, exactly as it
//! appears in a workflow document. Its [`TaskKind`] selects the executor that
//! runs it; the remaining fields are interpreted by that executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use super::arguments::Arguments;
use super::filter::Filter;
use super::types::TaskId;

/// Errors raised while executing a single task.
///
/// These are attributed to one vertex of the graph and never abort
/// unrelated vertices.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A process exited with a non-zero status.
    #[error("{}", exit_message(*code, stderr))]
    CommandFailed { code: Option<i32>, stderr: String },

    /// A process could not be launched or awaited.
    #[error("command `{command}` failed")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A container ran but exited with a non-zero status.
    #[error("container exited with code {code}: {logs}")]
    ContainerExited { code: i64, logs: String },

    /// The container runtime rejected a request.
    #[error("container runtime error: {0}")]
    Container(String),

    /// Building an image from a build context failed.
    #[error("image build failed: {0}")]
    Build(String),

    /// Neither a built-in plugin nor a script matched the command.
    #[error("no plugin or script `{0}` found")]
    PluginNotFound(String),

    /// A plugin command resolved to a directory instead of a file.
    #[error("script `{}` is a directory", .0.display())]
    ScriptIsDirectory(PathBuf),

    /// A built-in plugin returned an error.
    #[error("plugin failed: {0}")]
    Plugin(String),

    /// Filesystem error while preparing the task.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The executor panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

fn exit_message(code: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    match (stderr.is_empty(), code) {
        (false, _) => stderr.to_string(),
        (true, Some(code)) => format!("command exited with code {}", code),
        (true, None) => "command terminated by signal".to_string(),
    }
}

impl TaskError {
    /// Whether this failure stems from a misconfigured workflow rather than
    /// from the work itself.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TaskError::ScriptIsDirectory(_))
    }
}

/// The executor family a task runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskKind {
    /// A command line run through `sh` in the store directory.
    Shell,
    /// A command run inside a container created from `image`.
    Container,
    /// A container whose image is first built from a build context.
    ContainerFromBuild,
    /// A built-in plugin, or a script found in the plugin directory.
    Plugin,
}

/// The `type` field named a kind that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task type '{0}'")]
pub struct UnknownTaskKind(pub String);

impl TaskKind {
    /// The name used for this kind in workflow documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Shell => "bash",
            TaskKind::Container => "docker",
            TaskKind::ContainerFromBuild => "dockerfile",
            TaskKind::Plugin => "plugin",
        }
    }
}

impl FromStr for TaskKind {
    type Err = UnknownTaskKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bash" => Ok(TaskKind::Shell),
            "docker" => Ok(TaskKind::Container),
            "dockerfile" => Ok(TaskKind::ContainerFromBuild),
            "plugin" => Ok(TaskKind::Plugin),
            other => Err(UnknownTaskKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for TaskKind {
    type Error = UnknownTaskKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a workflow.
///
/// The task's name is the key it is stored under in the workflow; it is not
/// part of the descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Executor family.
    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// Names of tasks that must succeed before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<TaskId>,

    /// Shell line, plugin name plus arguments, or in-container command.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    /// Image reference for container tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Build context directory (relative to the plugin directory).
    #[serde(
        default,
        rename = "dockerfile",
        skip_serializing_if = "Option::is_none"
    )]
    pub build_source: Option<String>,

    /// Task-specific parameters.
    #[serde(default, alias = "with", skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,

    /// Records the task should act on.
    #[serde(default, skip_serializing_if = "Filter::is_empty")]
    pub filter: Filter,
}

impl Task {
    fn of_kind(kind: TaskKind) -> Self {
        Self {
            kind,
            requires: Vec::new(),
            command: String::new(),
            image: None,
            build_source: None,
            arguments: Arguments::default(),
            filter: Filter::default(),
        }
    }

    /// A task that runs `command` through the shell.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::of_kind(TaskKind::Shell)
        }
    }

    /// A task that runs `command` in a container from `image`.
    pub fn container(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            command: command.into(),
            ..Self::of_kind(TaskKind::Container)
        }
    }

    /// A task whose image is built from `build_source` first.
    pub fn container_from_build(build_source: impl Into<String>) -> Self {
        Self {
            build_source: Some(build_source.into()),
            ..Self::of_kind(TaskKind::ContainerFromBuild)
        }
    }

    /// A task that runs a built-in plugin or plugin-directory script.
    pub fn plugin(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::of_kind(TaskKind::Plugin)
        }
    }

    /// Builder: declare requirements.
    pub fn requires<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }

    /// Builder: set the in-container command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Builder: add an argument.
    pub fn with_argument(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.arguments.insert(name, value);
        self
    }

    /// Builder: set the filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Name of the first field this task's kind needs but lacks.
    pub fn missing_field(&self) -> Option<&'static str> {
        match self.kind {
            TaskKind::Shell | TaskKind::Plugin if self.command.trim().is_empty() => {
                Some("command")
            }
            TaskKind::Container if self.image.as_deref().is_none_or(str::is_empty) => {
                Some("image")
            }
            TaskKind::ContainerFromBuild
                if self.build_source.as_deref().is_none_or(str::is_empty) =>
            {
                Some("dockerfile")
            }
            _ => None,
        }
    }
}
