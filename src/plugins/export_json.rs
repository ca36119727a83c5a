//! `export-json`: write matching store records to a JSON file.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{Plugin, PluginError, required};
use crate::core::arguments::Arguments;
use crate::core::filter::{Filter, Record};
use crate::store::StoreHandle;

/// Exports every record matching the filter to a JSON array in `file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportJson;

#[async_trait]
impl Plugin for ExportJson {
    fn description(&self) -> &str {
        "Export json files"
    }

    async fn run(
        &self,
        store: &StoreHandle,
        arguments: &Arguments,
        filter: &Filter,
    ) -> Result<(), PluginError> {
        let path = PathBuf::from(required(arguments, "file")?);

        let selected: Vec<Record> = store
            .all()
            .await?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect();

        let content = serde_json::to_vec_pretty(&selected)
            .map_err(|e| PluginError::InvalidInput(e.to_string()))?;

        debug!(file = %path.display(), count = selected.len(), "exporting records");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(source) = tokio::fs::create_dir_all(parent).await {
                return Err(PluginError::Io { path, source });
            }
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| PluginError::Io { path, source })
    }
}
