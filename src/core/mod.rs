//! Core workflow model: identifiers, arguments, filters, tasks, and the
//! dependency graph.

pub mod arguments;
pub mod dag;
pub mod filter;
pub mod task;
pub mod types;
pub mod workflow;
