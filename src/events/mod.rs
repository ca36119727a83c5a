//! Lifecycle events and event handling.
//!
//! The walker emits an [`Event`] whenever a run or a task changes state.
//! Handlers registered on an [`EventBus`] observe them in emission order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::task::TaskKind;
use crate::core::types::{RunId, TaskId};

/// Lifecycle events emitted during a run.
#[derive(Debug, Clone)]
pub enum Event {
    /// A workflow run has started.
    WorkflowStarted {
        run_id: RunId,
        task_count: usize,
        timestamp: Instant,
    },

    /// A task acquired its slot and is about to execute.
    TaskStarted {
        task_id: TaskId,
        run_id: RunId,
        kind: TaskKind,
        timestamp: Instant,
    },

    /// A task completed successfully.
    TaskCompleted {
        task_id: TaskId,
        run_id: RunId,
        duration: Duration,
        output: Option<String>,
        timestamp: Instant,
    },

    /// A task failed.
    TaskFailed {
        task_id: TaskId,
        run_id: RunId,
        error: String,
        timestamp: Instant,
    },

    /// A task was not attempted because a requirement did not succeed.
    TaskSkipped {
        task_id: TaskId,
        run_id: RunId,
        blocked_by: TaskId,
        timestamp: Instant,
    },

    /// A workflow run finished.
    WorkflowCompleted {
        run_id: RunId,
        success: bool,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::WorkflowStarted { timestamp, .. }
            | Event::TaskStarted { timestamp, .. }
            | Event::TaskCompleted { timestamp, .. }
            | Event::TaskFailed { timestamp, .. }
            | Event::TaskSkipped { timestamp, .. }
            | Event::WorkflowCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// The task this event concerns, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskStarted { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskSkipped { task_id, .. } => Some(task_id),
            Event::WorkflowStarted { .. } | Event::WorkflowCompleted { .. } => None,
        }
    }

    pub fn workflow_started(run_id: RunId, task_count: usize) -> Self {
        Event::WorkflowStarted {
            run_id,
            task_count,
            timestamp: Instant::now(),
        }
    }

    pub fn task_started(task_id: TaskId, run_id: RunId, kind: TaskKind) -> Self {
        Event::TaskStarted {
            task_id,
            run_id,
            kind,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskCompleted event. Empty output is recorded as `None`.
    pub fn task_completed(
        task_id: TaskId,
        run_id: RunId,
        duration: Duration,
        output: impl Into<String>,
    ) -> Self {
        let output = output.into();
        Event::TaskCompleted {
            task_id,
            run_id,
            duration,
            output: (!output.trim().is_empty()).then_some(output),
            timestamp: Instant::now(),
        }
    }

    pub fn task_failed(task_id: TaskId, run_id: RunId, error: impl Into<String>) -> Self {
        Event::TaskFailed {
            task_id,
            run_id,
            error: error.into(),
            timestamp: Instant::now(),
        }
    }

    pub fn task_skipped(task_id: TaskId, run_id: RunId, blocked_by: TaskId) -> Self {
        Event::TaskSkipped {
            task_id,
            run_id,
            blocked_by,
            timestamp: Instant::now(),
        }
    }

    pub fn workflow_completed(run_id: RunId, success: bool, duration: Duration) -> Self {
        Event::WorkflowCompleted {
            run_id,
            success,
            duration,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
