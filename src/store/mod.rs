//! Evidence store abstraction.
//!
//! Tasks read records from and write records into a store that lives in the
//! run's working directory. This module provides the store trait, two
//! backends (JSON-lines on disk, in-memory), and the write gate the walker
//! uses to keep concurrent built-in plugins from interleaving mutations.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::filter::{Filter, Record};

/// Attribute holding a record's type.
pub const TYPE_ATTRIBUTE: &str = "type";

/// Attribute holding a record's identifier.
pub const ID_ATTRIBUTE: &str = "id";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored or inserted record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record was missing its type attribute.
    #[error("record has no '{TYPE_ATTRIBUTE}' attribute")]
    MissingType,

    /// Store lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// A container of typed evidence records.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Insert a record, assigning it an identifier if it has none.
    ///
    /// Returns the record's identifier.
    async fn insert(&self, record: Record) -> Result<String, StoreError>;

    /// Records of `record_type` that match `filter`.
    async fn select(&self, record_type: &str, filter: &Filter) -> Result<Vec<Record>, StoreError>;

    /// Every record in insertion order.
    async fn all(&self) -> Result<Vec<Record>, StoreError>;
}

/// Ensure `record` has a string `type` and an `id`, returning the id.
pub(crate) fn stamp_identifier(record: &mut Record) -> Result<String, StoreError> {
    let record_type = record
        .get(TYPE_ATTRIBUTE)
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or(StoreError::MissingType)?
        .to_string();

    if let Some(id) = record.get(ID_ATTRIBUTE).and_then(Value::as_str) {
        return Ok(id.to_string());
    }

    let id = format!("{}--{}", record_type, uuid::Uuid::new_v4());
    record.insert(ID_ATTRIBUTE.to_string(), Value::String(id.clone()));
    Ok(id)
}

pub(crate) fn is_of_type(record: &Record, record_type: &str) -> bool {
    record.get(TYPE_ATTRIBUTE).and_then(Value::as_str) == Some(record_type)
}

/// How concurrently running tasks share the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreAccess {
    /// Tasks run concurrently; built-in plugin inserts are serialized.
    #[default]
    SerializeWrites,
    /// Task executions are serialized as a whole.
    SerializeTasks,
    /// No serialization at all.
    Concurrent,
}

impl StoreAccess {
    /// Gate held around each whole vertex execution.
    pub fn task_gate(&self) -> WriteGate {
        match self {
            StoreAccess::SerializeTasks => WriteGate::serialized(),
            _ => WriteGate::open(),
        }
    }

    /// Gate held around each store mutation.
    ///
    /// Open under `SerializeTasks`, where the task gate already excludes
    /// other writers.
    pub fn write_gate(&self) -> WriteGate {
        match self {
            StoreAccess::SerializeWrites => WriteGate::serialized(),
            _ => WriteGate::open(),
        }
    }
}

impl std::str::FromStr for StoreAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serialize_writes" | "serialize-writes" => Ok(StoreAccess::SerializeWrites),
            "serialize_tasks" | "serialize-tasks" => Ok(StoreAccess::SerializeTasks),
            "concurrent" => Ok(StoreAccess::Concurrent),
            other => Err(format!("unknown store access mode '{}'", other)),
        }
    }
}

/// Optional run-wide mutual exclusion.
///
/// Clones share the same lock. An open gate never blocks.
#[derive(Debug, Clone, Default)]
pub struct WriteGate {
    lock: Option<Arc<Mutex<()>>>,
}

impl WriteGate {
    /// A gate that admits one holder at a time.
    pub fn serialized() -> Self {
        Self {
            lock: Some(Arc::new(Mutex::new(()))),
        }
    }

    /// A gate that never blocks.
    pub fn open() -> Self {
        Self { lock: None }
    }

    /// Check if this gate serializes its holders.
    pub fn is_serialized(&self) -> bool {
        self.lock.is_some()
    }

    /// Wait for the gate. The returned guard releases it on drop.
    pub async fn enter(&self) -> Option<OwnedMutexGuard<()>> {
        match &self.lock {
            Some(lock) => Some(Arc::clone(lock).lock_owned().await),
            None => None,
        }
    }
}

/// The store as seen by a running built-in plugin.
///
/// Inserts pass through the run's write gate; reads do not.
#[derive(Clone)]
pub struct StoreHandle {
    dir: PathBuf,
    store: Arc<dyn EvidenceStore>,
    gate: WriteGate,
}

impl StoreHandle {
    /// Wrap a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, store: Arc<dyn EvidenceStore>, gate: WriteGate) -> Self {
        Self {
            dir: dir.into(),
            store,
            gate,
        }
    }

    /// Open the JSON-lines store in `dir`.
    pub fn open(dir: impl Into<PathBuf>, gate: WriteGate) -> Self {
        let dir = dir.into();
        let store = Arc::new(JsonLinesStore::new(&dir));
        Self { dir, store, gate }
    }

    /// The store's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert one record under the write gate.
    pub async fn insert(&self, record: Record) -> Result<String, StoreError> {
        let _guard = self.gate.enter().await;
        self.store.insert(record).await
    }

    /// Insert many records, holding the write gate once for the batch.
    pub async fn insert_all(&self, records: Vec<Record>) -> Result<Vec<String>, StoreError> {
        let _guard = self.gate.enter().await;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.store.insert(record).await?);
        }
        Ok(ids)
    }

    /// Records of `record_type` that match `filter`.
    pub async fn select(&self, record_type: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        self.store.select(record_type, filter).await
    }

    /// Every record.
    pub async fn all(&self) -> Result<Vec<Record>, StoreError> {
        self.store.all().await
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("dir", &self.dir)
            .field("serialized", &self.gate.is_serialized())
            .finish()
    }
}
