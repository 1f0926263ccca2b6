//! In-memory storage implementation for testing.
//!
//! This provides a simple in-memory implementation of [`VersionStorage`]
//! for use in unit tests and development servers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::storage::{BatchOp, StorageResult, VersionStorage};
use crate::error::NotesError;

type DocEntries = BTreeMap<String, Vec<u8>>;

/// In-memory version storage for testing.
///
/// This implementation stores all data in memory using `HashMap`.
/// It's thread-safe via `RwLock` but data is lost when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    /// Per-document entries (doc_id -> key -> value)
    docs: Arc<RwLock<HashMap<String, DocEntries>>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents with at least one key.
    pub fn doc_count(&self) -> StorageResult<usize> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.values().filter(|entries| !entries.is_empty()).count())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> NotesError {
    NotesError::Storage("memory storage lock poisoned".to_string())
}

impl VersionStorage for MemoryStorage {
    fn get(&self, doc_id: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(doc_id).and_then(|entries| entries.get(key)).cloned())
    }

    fn put(&self, doc_id: &str, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.entry(doc_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, doc_id: &str, key: &str) -> StorageResult<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if let Some(entries) = docs.get_mut(doc_id) {
            entries.remove(key);
        }
        Ok(())
    }

    fn keys(&self, doc_id: &str) -> StorageResult<Vec<String>> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs
            .get(doc_id)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn apply_batch(&self, doc_id: &str, ops: &[BatchOp]) -> StorageResult<()> {
        // A single write lock makes the batch atomic for readers.
        let mut docs = self.docs.write().map_err(poisoned)?;
        let entries = docs.entry(doc_id.to_string()).or_default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}
