//! `import-json`: load a JSON array of records into the store.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use super::{Plugin, PluginError, required};
use crate::core::arguments::Arguments;
use crate::core::filter::{Filter, Record};
use crate::store::{StoreHandle, TYPE_ATTRIBUTE};

/// Imports a JSON array of objects as records of a given type.
///
/// Arguments: `file` (path to the JSON document) and `type` (stamped onto
/// every imported record). Only records matching the task filter are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportJson;

#[async_trait]
impl Plugin for ImportJson {
    fn description(&self) -> &str {
        "Import json files"
    }

    async fn run(
        &self,
        store: &StoreHandle,
        arguments: &Arguments,
        filter: &Filter,
    ) -> Result<(), PluginError> {
        let record_type = required(arguments, "type")?;
        let path = PathBuf::from(required(arguments, "file")?);

        let content = tokio::fs::read(&path)
            .await
            .map_err(|source| PluginError::Io {
                path: path.clone(),
                source,
            })?;

        let items: Vec<Record> = serde_json::from_slice(&content).map_err(|_| {
            PluginError::InvalidInput(
                "imported json must have a top level array containing objects".to_string(),
            )
        })?;

        let selected: Vec<Record> = items
            .into_iter()
            .map(|mut item| {
                item.insert(
                    TYPE_ATTRIBUTE.to_string(),
                    Value::String(record_type.to_string()),
                );
                item
            })
            .filter(|item| filter.matches(item))
            .collect();

        debug!(
            file = %path.display(),
            record_type,
            count = selected.len(),
            "importing records"
        );
        store.insert_all(selected).await?;
        Ok(())
    }
}
