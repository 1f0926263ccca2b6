//! Bounded version log and snapshot blobs on top of [`VersionStorage`].

use std::sync::Arc;

use log::debug;
use serde::de::DeserializeOwned;

use super::storage::{BatchOp, VersionStorage};
use super::types::{EditorInfo, Version};
use crate::config::DEFAULT_MAX_VERSIONS;
use crate::error::{NotesError, Result};

pub(crate) const VERSIONS_KEY: &str = "versions";
pub(crate) const LAST_SAVE_KEY: &str = "lastVersionSave";
pub(crate) const STATE_HASH_KEY: &str = "lastStateHash";
pub(crate) const ACTIVE_USER_KEY: &str = "lastActiveUser";
pub(crate) const DOCUMENT_KEY: &str = "document";

/// Storage key of a version's snapshot blob.
pub fn version_key(version_id: &str) -> String {
    format!("version:{}", version_id)
}

/// Storage key of a registered editor.
pub fn editor_key(editor_id: &str) -> String {
    format!("editor:{}", editor_id)
}

/// Append-only, bounded log of versions plus their snapshot blobs.
///
/// The newest version is always first. Once more than `max_versions` are
/// recorded, the oldest are dropped together with their blobs.
#[derive(Clone)]
pub struct VersionStore {
    storage: Arc<dyn VersionStorage>,
    max_versions: usize,
}

impl VersionStore {
    /// Create a store keeping the default number of versions.
    pub fn new(storage: Arc<dyn VersionStorage>) -> Self {
        Self::with_max_versions(storage, DEFAULT_MAX_VERSIONS)
    }

    /// Create a store keeping at most `max_versions` versions per document.
    pub fn with_max_versions(storage: Arc<dyn VersionStorage>, max_versions: usize) -> Self {
        Self {
            storage,
            max_versions: max_versions.max(1),
        }
    }

    /// The underlying storage backend.
    pub fn storage(&self) -> &Arc<dyn VersionStorage> {
        &self.storage
    }

    /// Retention bound per document.
    pub fn max_versions(&self) -> usize {
        self.max_versions
    }

    // ==================== Versions ====================

    /// Versions of a document, newest first.
    pub fn list(&self, doc_id: &str) -> Result<Vec<Version>> {
        Ok(self.get_json(doc_id, VERSIONS_KEY)?.unwrap_or_default())
    }

    /// Snapshot bytes of a version.
    ///
    /// # Errors
    ///
    /// Returns [`NotesError::NotFound`] if the version has no blob.
    pub fn get_blob(&self, doc_id: &str, version_id: &str) -> Result<Vec<u8>> {
        self.storage
            .get(doc_id, &version_key(version_id))?
            .ok_or_else(|| NotesError::version_not_found(doc_id, version_id))
    }

    /// Record a new version. Returns the evicted versions.
    pub fn append(&self, doc_id: &str, version: Version, blob: &[u8]) -> Result<Vec<Version>> {
        let existing = self.list(doc_id)?;
        self.commit(doc_id, existing, version, blob, Vec::new())
    }

    /// Write a version's blob, then the updated list, evictions and `extra`
    /// writes in one batch.
    ///
    /// If the batch fails, the list and policy state are untouched; the blob
    /// may remain but is unreachable and gets overwritten by a retry under
    /// the same id.
    pub(crate) fn commit(
        &self,
        doc_id: &str,
        existing: Vec<Version>,
        version: Version,
        blob: &[u8],
        extra: Vec<BatchOp>,
    ) -> Result<Vec<Version>> {
        self.storage.put(doc_id, &version_key(&version.id), blob)?;

        let mut versions = Vec::with_capacity(existing.len() + 1);
        versions.push(version);
        versions.extend(existing);
        let evicted = if versions.len() > self.max_versions {
            versions.split_off(self.max_versions)
        } else {
            Vec::new()
        };

        let mut ops = Vec::with_capacity(evicted.len() + extra.len() + 1);
        ops.push(BatchOp::put(VERSIONS_KEY, serde_json::to_vec(&versions)?));
        ops.extend(evicted.iter().map(|v| BatchOp::delete(version_key(&v.id))));
        ops.extend(extra);
        self.storage.apply_batch(doc_id, &ops)?;

        if !evicted.is_empty() {
            debug!(
                "Evicted {} version(s) of '{}' beyond retention of {}",
                evicted.len(),
                doc_id,
                self.max_versions
            );
        }
        Ok(evicted)
    }

    // ==================== Policy state ====================

    /// Time of the last recorded version (epoch ms).
    pub fn last_save(&self, doc_id: &str) -> Result<Option<i64>> {
        self.get_json(doc_id, LAST_SAVE_KEY)
    }

    /// Fingerprint of the last recorded snapshot.
    pub fn last_state_hash(&self, doc_id: &str) -> Result<Option<String>> {
        self.get_json(doc_id, STATE_HASH_KEY)
    }

    /// Forget the last fingerprint so the next snapshot counts as changed.
    pub fn clear_state_hash(&self, doc_id: &str) -> Result<()> {
        self.storage.delete(doc_id, STATE_HASH_KEY)
    }

    /// Batch writes recording a successful snapshot.
    pub(crate) fn policy_state_ops(now_ms: i64, state_hash: &str) -> Result<Vec<BatchOp>> {
        Ok(vec![
            BatchOp::put(LAST_SAVE_KEY, serde_json::to_vec(&now_ms)?),
            BatchOp::put(STATE_HASH_KEY, serde_json::to_vec(state_hash)?),
        ])
    }

    // ==================== Attribution ====================

    /// The editor the next version will be attributed to.
    pub fn last_active_user(&self, doc_id: &str) -> Result<Option<EditorInfo>> {
        self.get_json(doc_id, ACTIVE_USER_KEY)
    }

    /// Attribution registered by one editor connection.
    pub fn editor(&self, doc_id: &str, editor_id: &str) -> Result<Option<EditorInfo>> {
        self.get_json(doc_id, &editor_key(editor_id))
    }

    /// Record an editor and make it the last active one.
    pub fn set_active_editor(
        &self,
        doc_id: &str,
        editor_id: &str,
        info: &EditorInfo,
    ) -> Result<()> {
        let value = serde_json::to_vec(info)?;
        self.storage.apply_batch(
            doc_id,
            &[
                BatchOp::put(editor_key(editor_id), value.clone()),
                BatchOp::put(ACTIVE_USER_KEY, value),
            ],
        )
    }

    // ==================== Live document ====================

    /// Saved live state of a document, if any.
    pub fn load_document(&self, doc_id: &str) -> Result<Option<Vec<u8>>> {
        self.storage.get(doc_id, DOCUMENT_KEY)
    }

    /// Save the live state of a document.
    pub fn save_document(&self, doc_id: &str, state: &[u8]) -> Result<()> {
        self.storage.put(doc_id, DOCUMENT_KEY, state)
    }

    fn get_json<T: DeserializeOwned>(&self, doc_id: &str, key: &str) -> Result<Option<T>> {
        match self.storage.get(doc_id, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore")
            .field("max_versions", &self.max_versions)
            .finish_non_exhaustive()
    }
}
