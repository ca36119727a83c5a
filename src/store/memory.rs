//! In-memory store implementation.
//!
//! Thread-safe backend for tests and dry runs. Records are not persisted.

use async_trait::async_trait;
use std::sync::RwLock;

use super::{EvidenceStore, StoreError, is_of_type, stamp_identifier};
use crate::core::filter::{Filter, Record};

/// In-memory store backend.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<Record>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EvidenceStore for InMemoryStore {
    async fn insert(&self, mut record: Record) -> Result<String, StoreError> {
        let id = stamp_identifier(&mut record)?;
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        records.push(record);
        Ok(id)
    }

    async fn select(&self, record_type: &str, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|r| is_of_type(r, record_type) && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.clone())
    }
}
