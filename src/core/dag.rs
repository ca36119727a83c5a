//! Dependency graph over task names.
//!
//! Vertices are task names; an edge `u → v` means `u` must succeed before
//! `v` may start. The graph is derived from each task's `requires` list and
//! is rejected if it contains a cycle or names a task that does not exist.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use thiserror::Error;

use super::task::Task;
use super::types::TaskId;

/// Errors that can occur when building a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A cycle was detected in the graph.
    #[error("cycle detected involving task: {0}")]
    CycleDetected(TaskId),

    /// A task requires a name that is not in the workflow.
    #[error("task '{task}' requires unknown task '{requirement}'")]
    UnknownDependency { task: TaskId, requirement: TaskId },

    /// Attempted to add a duplicate vertex.
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskId),

    /// Vertex not found in the graph.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Directed acyclic graph of task names.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Edges keyed by dependent: v -> tasks v requires.
    requirements: BTreeMap<TaskId, BTreeSet<TaskId>>,

    /// Edges keyed by requirement: u -> tasks that require u.
    dependents: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate the graph for a set of named tasks.
    ///
    /// Adds one vertex per task and one edge per entry in each task's
    /// `requires`. No other edges are added.
    pub fn build(tasks: &BTreeMap<TaskId, Task>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for name in tasks.keys() {
            graph.add_vertex(name.clone())?;
        }
        for (name, task) in tasks {
            for requirement in &task.requires {
                graph.connect(requirement, name)?;
            }
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Add a vertex with no edges.
    pub fn add_vertex(&mut self, id: TaskId) -> Result<(), GraphError> {
        if self.requirements.contains_key(&id) {
            return Err(GraphError::DuplicateTask(id));
        }
        self.requirements.insert(id.clone(), BTreeSet::new());
        self.dependents.insert(id, BTreeSet::new());
        Ok(())
    }

    /// Add an edge: `dependent` requires `requirement`.
    pub fn connect(&mut self, requirement: &TaskId, dependent: &TaskId) -> Result<(), GraphError> {
        if !self.requirements.contains_key(dependent) {
            return Err(GraphError::TaskNotFound(dependent.clone()));
        }
        if !self.requirements.contains_key(requirement) {
            return Err(GraphError::UnknownDependency {
                task: dependent.clone(),
                requirement: requirement.clone(),
            });
        }

        self.requirements
            .entry(dependent.clone())
            .or_default()
            .insert(requirement.clone());
        self.dependents
            .entry(requirement.clone())
            .or_default()
            .insert(dependent.clone());
        Ok(())
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    /// Check if the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Check if a vertex exists.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.requirements.contains_key(id)
    }

    /// All vertices in name order.
    pub fn vertices(&self) -> impl Iterator<Item = &TaskId> {
        self.requirements.keys()
    }

    /// Tasks that `id` requires.
    pub fn requirements(&self, id: &TaskId) -> Option<&BTreeSet<TaskId>> {
        self.requirements.get(id)
    }

    /// Tasks that require `id`.
    pub fn dependents(&self, id: &TaskId) -> Option<&BTreeSet<TaskId>> {
        self.dependents.get(id)
    }

    /// Number of unmet requirements per vertex before anything has run.
    pub fn in_degrees(&self) -> HashMap<TaskId, usize> {
        self.requirements
            .iter()
            .map(|(id, reqs)| (id.clone(), reqs.len()))
            .collect()
    }

    /// Vertices with no requirements.
    pub fn roots(&self) -> Vec<TaskId> {
        self.requirements
            .iter()
            .filter(|(_, reqs)| reqs.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every vertex reachable from `id` along dependent edges.
    pub fn transitive_dependents(&self, id: &TaskId) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&TaskId> = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            if let Some(next) = self.dependents.get(current) {
                for dependent in next {
                    if seen.insert(dependent.clone()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        seen
    }

    /// Reject the graph if it contains a cycle.
    ///
    /// Depth-first search with on-stack marking; the reported task is the
    /// one whose edge closes the cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut marks: HashMap<&TaskId, Mark> = self
            .requirements
            .keys()
            .map(|id| (id, Mark::Unvisited))
            .collect();

        for start in self.requirements.keys() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a TaskId,
        marks: &mut HashMap<&'a TaskId, Mark>,
    ) -> Result<(), GraphError> {
        marks.insert(id, Mark::OnStack);

        if let Some(dependents) = self.dependents.get(id) {
            for next in dependents {
                match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
                    Mark::OnStack => return Err(GraphError::CycleDetected(next.clone())),
                    Mark::Unvisited => self.visit(next, marks)?,
                    Mark::Done => {}
                }
            }
        }

        marks.insert(id, Mark::Done);
        Ok(())
    }

    /// Vertices in an order where every requirement precedes its dependents.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        // Kahn's algorithm
        let mut in_degree = self.in_degrees();
        let mut queue: VecDeque<TaskId> = self.roots().into();
        let mut result = Vec::with_capacity(self.len());

        while let Some(id) = queue.pop_front() {
            if let Some(downstream) = self.dependents.get(&id) {
                for next in downstream {
                    if let Some(degree) = in_degree.get_mut(next) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(next.clone());
                        }
                    }
                }
            }
            result.push(id);
        }

        if result.len() != self.len() {
            let stuck = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id)
                .min();
            if let Some(id) = stuck {
                return Err(GraphError::CycleDetected(id));
            }
        }

        Ok(result)
    }
}
