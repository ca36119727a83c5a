//! JSON-lines store implementation.
//!
//! One record per line in `records.jsonl` inside the store directory. Each
//! insert is a single appending write of one complete line.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{EvidenceStore, StoreError, is_of_type, stamp_identifier};
use crate::core::filter::{Filter, Record};

/// File name of the record log inside a store directory.
pub const RECORDS_FILE: &str = "records.jsonl";

/// Store backed by a JSON-lines file.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    dir: PathBuf,
    path: PathBuf,
}

impl JsonLinesStore {
    /// A store rooted at `dir`. Nothing is created until the first insert.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(RECORDS_FILE);
        Self { dir, path }
    }

    /// Path of the record log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_all(&self) -> Result<Vec<Record>, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl EvidenceStore for JsonLinesStore {
    async fn insert(&self, mut record: Record) -> Result<String, StoreError> {
        let id = stamp_identifier(&mut record)?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error(e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        Ok(id)
    }

    async fn select(&self, record_type: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| is_of_type(r, record_type) && filter.matches(r))
            .collect())
    }

    async fn all(&self) -> Result<Vec<Record>, StoreError> {
        self.read_all().await
    }
}
