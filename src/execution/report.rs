//! Run results and the aggregate workflow error.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::executor::{TaskResult, TaskStatus};
use crate::core::dag::GraphError;
use crate::core::types::{RunId, TaskId};

/// Result of walking a workflow graph.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// Whether every task succeeded.
    pub success: bool,
    pub duration: Duration,
    /// Outcome of every vertex, keyed by name.
    pub results: BTreeMap<TaskId, TaskResult>,
    /// Tasks that ran and failed, in name order.
    pub failed_tasks: Vec<TaskId>,
    /// Tasks that were never attempted, in name order.
    pub skipped_tasks: Vec<TaskId>,
}

impl RunReport {
    pub(crate) fn new(run_id: RunId, duration: Duration, results: BTreeMap<TaskId, TaskResult>) -> Self {
        let with_status = |status: TaskStatus| -> Vec<TaskId> {
            results
                .values()
                .filter(|r| r.status == status)
                .map(|r| r.task_id.clone())
                .collect()
        };
        let failed_tasks = with_status(TaskStatus::Failed);
        let skipped_tasks = with_status(TaskStatus::Skipped);

        Self {
            run_id,
            success: failed_tasks.is_empty() && skipped_tasks.is_empty(),
            duration,
            results,
            failed_tasks,
            skipped_tasks,
        }
    }

    /// Final status of a task.
    pub fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.results.get(task_id).map(|r| r.status)
    }

    /// Result of a task.
    pub fn get_task_result(&self, task_id: &TaskId) -> Option<&TaskResult> {
        self.results.get(task_id)
    }

    /// Get the number of succeeded tasks.
    pub fn succeeded_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.status == TaskStatus::Succeeded)
            .count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.failed_tasks.len()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.skipped_tasks.len()
    }
}

/// Every failed and skipped task of an unsuccessful run.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub report: RunReport,
}

impl FailureReport {
    /// `(task, error)` for each failed task.
    pub fn failures(&self) -> Vec<(&TaskId, &str)> {
        self.report
            .failed_tasks
            .iter()
            .filter_map(|id| {
                let result = self.report.results.get(id)?;
                Some((id, result.error.as_deref().unwrap_or("unknown error")))
            })
            .collect()
    }

    /// Failed tasks whose failure stems from workflow configuration.
    pub fn misconfigured(&self) -> Vec<&TaskId> {
        self.report
            .failed_tasks
            .iter()
            .filter(|id| self.report.results.get(*id).is_some_and(|r| r.misconfigured))
            .collect()
    }

    /// `(task, blocking requirement)` for each skipped task.
    pub fn skips(&self) -> Vec<(&TaskId, Option<&TaskId>)> {
        self.report
            .skipped_tasks
            .iter()
            .map(|id| {
                let blocker = self
                    .report
                    .results
                    .get(id)
                    .and_then(|r| r.blocked_by.as_ref());
                (id, blocker)
            })
            .collect()
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "workflow failed: {} failed, {} skipped",
            self.report.failed_count(),
            self.report.skipped_count()
        )?;
        let misconfigured = self.misconfigured();
        for (id, error) in self.failures() {
            if misconfigured.contains(&id) {
                write!(f, "\n  {}: misconfigured: {}", id, error.trim())?;
            } else {
                write!(f, "\n  {}: {}", id, error.trim())?;
            }
        }
        for (id, blocker) in self.skips() {
            match blocker {
                Some(blocker) => write!(f, "\n  {}: skipped, requirement {} did not succeed", id, blocker)?,
                None => write!(f, "\n  {}: skipped", id)?,
            }
        }
        Ok(())
    }
}

/// Top-level error of a workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The workflow is misconfigured; nothing was executed.
    #[error("invalid workflow: {0}")]
    Invalid(#[from] GraphError),

    /// A task lacks a field its kind requires; nothing was executed.
    #[error("invalid workflow: task '{task}' is missing required field '{field}'")]
    MissingField { task: TaskId, field: &'static str },

    /// At least one task failed or was skipped.
    #[error("{0}")]
    Failed(FailureReport),
}

impl WorkflowError {
    /// The run report, if execution took place.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            WorkflowError::Failed(failure) => Some(&failure.report),
            _ => None,
        }
    }
}
