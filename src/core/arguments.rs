//! Task arguments and their command-line form.
//!
//! Arguments are name → value pairs handed to every executor. Values come
//! straight from the workflow document, so they may be scalars, lists, or
//! mappings. When a task runs as an external process the arguments are
//! rendered as `--name=value` flags:
//!
//! - scalars render as-is (`--type=file`)
//! - lists repeat the flag once per element (`--filter=a=b --filter=c=d`)
//! - mappings render as `key=value` pairs sorted by key and joined by `,`
//! - `true` renders as a bare `--name`; `false` and `null` are omitted

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Ordered mapping of argument name to value.
///
/// Keys are kept sorted so the rendered command line is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an argument.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Add or replace an argument.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Get the raw value of an argument.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get an argument that holds a string.
    ///
    /// Returns `None` for missing arguments and for non-string values.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// Check if an argument is present.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Remove an argument, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Iterate over arguments in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    /// Check if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Layer `overrides` on top of these arguments.
    ///
    /// Used to apply task arguments over workflow-wide defaults.
    pub fn merged(&self, overrides: &Arguments) -> Arguments {
        let mut values = self.values.clone();
        for (name, value) in &overrides.values {
            values.insert(name.clone(), value.clone());
        }
        Arguments { values }
    }

    /// Copy of these arguments without the given names.
    pub fn without(&self, names: &[&str]) -> Arguments {
        let values = self
            .values
            .iter()
            .filter(|(name, _)| !names.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Arguments { values }
    }

    /// Render the arguments as command-line flags.
    pub fn to_command_line(&self) -> Vec<String> {
        self.values
            .iter()
            .flat_map(|(name, value)| flags_for(name, value))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Arguments {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Render one named value as zero or more `--name[=value]` flags.
pub(crate) fn flags_for(name: &str, value: &Value) -> Vec<String> {
    match value {
        Value::Null | Value::Bool(false) => Vec::new(),
        Value::Bool(true) => vec![format!("--{}", name)],
        Value::Array(items) => items
            .iter()
            .filter_map(render_value)
            .map(|rendered| format!("--{}={}", name, rendered))
            .collect(),
        other => render_value(other)
            .map(|rendered| vec![format!("--{}={}", name, rendered)])
            .unwrap_or_default(),
    }
}

/// Render a single value the way it appears after `=` in a flag.
pub(crate) fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(map) => {
            let mut pairs: Vec<(&String, String)> = map
                .iter()
                .filter_map(|(k, v)| render_value(v).map(|v| (k, v)))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }
    }
}
