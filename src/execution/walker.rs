//! Graph walker.
//!
//! The walker runs every vertex once all of its requirements have succeeded.
//! Each vertex carries a counter of unmet requirements; when a vertex
//! succeeds, the counters of its dependents are decremented and any that
//! reach zero are released immediately, independent of unrelated branches.
//! When a vertex fails, every still-pending transitive dependent is marked
//! skipped. Running vertices are never cancelled.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, info_span, warn};

use super::container::ContainerExitPolicy;
use super::dispatch::Dispatcher;
use super::executor::{Invocation, RunContext, TaskOutput, TaskResult, TaskStatus};
use super::report::{FailureReport, RunReport, WorkflowError};
use crate::core::arguments::Arguments;
use crate::core::dag::Graph;
use crate::core::task::{Task, TaskError};
use crate::core::types::{RunId, TaskId};
use crate::core::workflow::Workflow;
use crate::events::{Event, EventBus};
use crate::plugins::PluginRegistry;
use crate::runtime::{ContainerRuntime, DockerCli};
use crate::store::{StoreAccess, StoreHandle};

type Completion = (TaskId, Result<TaskOutput, TaskError>, Duration);

/// Executes workflows.
pub struct Walker {
    plugins: Arc<PluginRegistry>,
    runtime: Arc<dyn ContainerRuntime>,
    container_exit: ContainerExitPolicy,
    max_concurrency: Option<usize>,
    store_access: StoreAccess,
    event_bus: Option<Arc<EventBus>>,
}

impl Walker {
    /// A walker using `plugins`, the `docker` CLI, unbounded concurrency,
    /// and the default store access and container exit policies.
    pub fn new(plugins: PluginRegistry) -> Self {
        Self {
            plugins: Arc::new(plugins),
            runtime: Arc::new(DockerCli::default()),
            container_exit: ContainerExitPolicy::default(),
            max_concurrency: None,
            store_access: StoreAccess::default(),
            event_bus: None,
        }
    }

    /// Use a different container runtime.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Limit the number of tasks executing at once. Zero is treated as one.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max.max(1));
        self
    }

    /// Set the store access policy.
    pub fn with_store_access(mut self, access: StoreAccess) -> Self {
        self.store_access = access;
        self
    }

    /// Set the container exit policy.
    pub fn with_container_exit(mut self, policy: ContainerExitPolicy) -> Self {
        self.container_exit = policy;
        self
    }

    /// Emit lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Build the graph, walk it, and aggregate the outcome.
    ///
    /// `arguments` are layered over the workflow's own defaults; task
    /// arguments are layered over both.
    pub async fn run(
        &self,
        workflow: &Workflow,
        working_dir: &Path,
        plugin_dir: &Path,
        arguments: &Arguments,
    ) -> Result<RunReport, WorkflowError> {
        let graph = workflow.graph()?;
        for (name, task) in &workflow.tasks {
            if let Some(field) = task.missing_field() {
                return Err(WorkflowError::MissingField {
                    task: name.clone(),
                    field,
                });
            }
        }

        let context = RunContext {
            working_dir: working_dir.to_path_buf(),
            plugin_dir: plugin_dir.to_path_buf(),
            arguments: workflow.arguments.merged(arguments),
            store: StoreHandle::open(working_dir, self.store_access.write_gate()),
        };
        let tasks = workflow
            .tasks
            .iter()
            .map(|(name, task)| (name.clone(), Arc::new(task.clone())))
            .collect();

        let report = self.walk(&graph, tasks, Arc::new(context)).await;
        if report.success {
            Ok(report)
        } else {
            Err(WorkflowError::Failed(FailureReport { report }))
        }
    }

    /// Walk a validated graph.
    ///
    /// `tasks` must hold a task for every vertex of `graph`.
    pub async fn walk(
        &self,
        graph: &Graph,
        tasks: HashMap<TaskId, Arc<Task>>,
        context: Arc<RunContext>,
    ) -> RunReport {
        let run_id = RunId::new();
        let span = info_span!("workflow_run", run = %run_id, task_count = graph.len());

        async {
            let start = Instant::now();
            debug!(run = %run_id, "starting workflow run");
            self.emit(Event::workflow_started(run_id, graph.len())).await;

            let dispatcher = Arc::new(Dispatcher::new(
                Arc::clone(&self.plugins),
                Arc::clone(&self.runtime),
                self.container_exit,
            ));
            let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));
            let task_gate = self.store_access.task_gate();

            let mut unmet = graph.in_degrees();
            let mut statuses: BTreeMap<TaskId, TaskStatus> = graph
                .vertices()
                .map(|id| (id.clone(), TaskStatus::Pending))
                .collect();
            let mut results: BTreeMap<TaskId, TaskResult> = BTreeMap::new();
            let mut ready: VecDeque<TaskId> = graph.roots().into();
            let mut running: JoinSet<Completion> = JoinSet::new();

            loop {
                while let Some(id) = ready.pop_front() {
                    let Some(task) = tasks.get(&id).cloned() else {
                        warn!(task = %id, "no task definition for vertex");
                        statuses.insert(id.clone(), TaskStatus::Failed);
                        let error = format!("no task definition for '{}'", id);
                        self.emit(Event::task_failed(id.clone(), run_id, error.clone()))
                            .await;
                        results.insert(id.clone(), TaskResult::failure(id.clone(), Duration::ZERO, error));
                        self.skip_dependents(graph, &id, run_id, &mut statuses, &mut results)
                            .await;
                        continue;
                    };

                    statuses.insert(id.clone(), TaskStatus::Running);
                    debug!(task = %id, "releasing task");

                    let dispatcher = Arc::clone(&dispatcher);
                    let context = Arc::clone(&context);
                    let semaphore = semaphore.clone();
                    let task_gate = task_gate.clone();
                    let bus = self.event_bus.clone();

                    running.spawn(async move {
                        let _permit = match semaphore {
                            Some(semaphore) => semaphore.acquire_owned().await.ok(),
                            None => None,
                        };
                        let _gate = task_gate.enter().await;

                        if let Some(bus) = &bus {
                            bus.emit(Event::task_started(id.clone(), run_id, task.kind))
                                .await;
                        }

                        let started = Instant::now();
                        let vertex = id.clone();
                        // a separate task so a panicking executor is attributed to its vertex
                        let handle = tokio::spawn(
                            async move {
                                let invocation = Invocation::new(&vertex, &task, &context);
                                dispatcher.dispatch(&invocation).await
                            }
                            .in_current_span(),
                        );
                        let outcome = match handle.await {
                            Ok(outcome) => outcome,
                            Err(e) => Err(TaskError::Panicked(panic_message(e))),
                        };
                        (id, outcome, started.elapsed())
                    }
                    .in_current_span());
                }

                let Some(joined) = running.join_next().await else {
                    break;
                };
                let (id, outcome, duration) = match joined {
                    Ok(completion) => completion,
                    Err(e) => {
                        warn!(error = %e, "task runner aborted");
                        continue;
                    }
                };

                match outcome {
                    Ok(output) => {
                        debug!(task = %id, duration_ms = %duration.as_millis(), "task succeeded");
                        statuses.insert(id.clone(), TaskStatus::Succeeded);
                        self.emit(Event::task_completed(
                            id.clone(),
                            run_id,
                            duration,
                            output.stdout.clone(),
                        ))
                        .await;
                        results.insert(id.clone(), TaskResult::success(id.clone(), duration, output));

                        for dependent in graph.dependents(&id).into_iter().flatten() {
                            if let Some(count) = unmet.get_mut(dependent) {
                                *count = count.saturating_sub(1);
                                if *count == 0 && statuses.get(dependent) == Some(&TaskStatus::Pending) {
                                    ready.push_back(dependent.clone());
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(task = %id, error = %err, "task failed");
                        statuses.insert(id.clone(), TaskStatus::Failed);
                        self.emit(Event::task_failed(id.clone(), run_id, err.to_string()))
                            .await;
                        results.insert(
                            id.clone(),
                            TaskResult::from_error(id.clone(), duration, &err),
                        );
                        self.skip_dependents(graph, &id, run_id, &mut statuses, &mut results)
                            .await;
                    }
                }
            }

            let report = RunReport::new(run_id, start.elapsed(), results);
            debug!(
                run = %run_id,
                success = report.success,
                duration_ms = %report.duration.as_millis(),
                succeeded = report.succeeded_count(),
                failed = report.failed_count(),
                skipped = report.skipped_count(),
                "workflow run completed"
            );
            self.emit(Event::workflow_completed(run_id, report.success, report.duration))
                .await;
            report
        }
        .instrument(span)
        .await
    }

    /// Mark every pending transitive dependent of `blocker` as skipped.
    async fn skip_dependents(
        &self,
        graph: &Graph,
        blocker: &TaskId,
        run_id: RunId,
        statuses: &mut BTreeMap<TaskId, TaskStatus>,
        results: &mut BTreeMap<TaskId, TaskResult>,
    ) {
        for dependent in graph.transitive_dependents(blocker) {
            if statuses.get(&dependent) != Some(&TaskStatus::Pending) {
                continue;
            }
            debug!(task = %dependent, blocked_by = %blocker, "skipping task");
            statuses.insert(dependent.clone(), TaskStatus::Skipped);
            self.emit(Event::task_skipped(dependent.clone(), run_id, blocker.clone()))
                .await;
            results.insert(
                dependent.clone(),
                TaskResult::skipped(dependent, blocker.clone()),
            );
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).await;
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Workflow {
    /// Run this workflow against the store in `working_dir`.
    ///
    /// Uses the `docker` CLI for container tasks and default policies; use
    /// [`Walker`] directly to configure them.
    pub async fn run(
        &self,
        working_dir: &Path,
        plugin_dir: &Path,
        plugins: PluginRegistry,
        arguments: &Arguments,
    ) -> Result<RunReport, WorkflowError> {
        Walker::new(plugins)
            .run(self, working_dir, plugin_dir, arguments)
            .await
    }
}
