//! Storage abstraction for version history.
//!
//! This module defines the [`VersionStorage`] trait, a per-document key-value
//! store. Backends only need read-your-writes consistency per document; no
//! cross-document transactions are required.

use crate::error::NotesError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, NotesError>;

/// One write of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put { key: String, value: Vec<u8> },
    /// Remove a key (no-op if absent).
    Delete { key: String },
}

impl BatchOp {
    /// Write `value` under `key`.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Delete `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        BatchOp::Delete { key: key.into() }
    }

    /// The key this operation writes.
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Trait for version history storage backends.
///
/// Keys are scoped by document id. The stored layout per document is:
///
/// - `versions`: JSON list of versions, newest first
/// - `version:<id>`: snapshot blob of that version
/// - `lastVersionSave`: JSON epoch-ms of the last recorded version
/// - `lastStateHash`: JSON fingerprint of the last recorded snapshot
/// - `lastActiveUser`: JSON editor attribution for the next version
/// - `editor:<editorId>`: JSON attribution registered by one connection
/// - `document`: live document state saved by the server
pub trait VersionStorage: Send + Sync {
    /// Read a value. Returns `None` if the key doesn't exist.
    fn get(&self, doc_id: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Write a value, overwriting any existing one.
    fn put(&self, doc_id: &str, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, doc_id: &str, key: &str) -> StorageResult<()>;

    /// List a document's keys in ascending order.
    fn keys(&self, doc_id: &str) -> StorageResult<Vec<String>>;

    /// Apply several writes to one document.
    ///
    /// Backends with transactions should override this so that either every
    /// write lands or none does.
    fn apply_batch(&self, doc_id: &str, ops: &[BatchOp]) -> StorageResult<()> {
        // Default implementation: apply writes sequentially (not atomic)
        for op in ops {
            match op {
                BatchOp::Put { key, value } => self.put(doc_id, key, value)?,
                BatchOp::Delete { key } => self.delete(doc_id, key)?,
            }
        }
        Ok(())
    }
}
