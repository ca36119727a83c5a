//! Record selection predicates.
//!
//! A [`Filter`] is a list of condition sets. A record matches when it
//! satisfies any one set, and it satisfies a set when every attribute in the
//! set contains the set's pattern as a substring. An empty filter matches
//! everything.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::arguments::render_value;

/// A single evidence record: a flat JSON object.
pub type Record = Map<String, Value>;

/// One AND-group of attribute → substring conditions.
pub type ConditionSet = BTreeMap<String, String>;

/// OR-of-ANDs substring predicate over record attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    conditions: Vec<ConditionSet>,
}

impl Filter {
    /// A filter that matches every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a condition set.
    pub fn or<K, V, I>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.conditions.push(
            conditions
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// The condition sets, in declaration order.
    pub fn conditions(&self) -> &[ConditionSet] {
        &self.conditions
    }

    /// Check if the filter has no condition sets.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Test whether a record matches the filter.
    pub fn matches(&self, record: &Record) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        self.conditions
            .iter()
            .any(|set| Self::matches_set(set, record))
    }

    fn matches_set(set: &ConditionSet, record: &Record) -> bool {
        set.iter().all(|(attribute, pattern)| {
            let value = record
                .get(attribute)
                .and_then(render_value)
                .unwrap_or_default();
            value.contains(pattern.as_str())
        })
    }

    /// Render as repeated `--filter=k=v,...` flags, one per condition set.
    pub fn to_command_line(&self) -> Vec<String> {
        self.conditions
            .iter()
            .map(|set| {
                let pairs: Vec<String> = set.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("--filter={}", pairs.join(","))
            })
            .collect()
    }
}

impl From<Vec<ConditionSet>> for Filter {
    fn from(conditions: Vec<ConditionSet>) -> Self {
        Self { conditions }
    }
}
