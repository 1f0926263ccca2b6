//! When to record a version of a live document.
//!
//! [`SnapshotPolicy`] decides, for each mutation event, whether the live
//! document's state becomes a new [`Version`]: attempts inside the throttle
//! window are dropped, and so are attempts whose snapshot fingerprint equals
//! the last recorded one. It also restores versions into live documents and
//! records which editor the next version is attributed to.
//!
//! All policy state (last save, fingerprint, version list) lives in storage,
//! scoped per document. Each document's read-modify-write runs under its own
//! lock, so racing mutation events on one note cannot both record a version
//! while different notes never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};

use super::fingerprint::fingerprint;
use super::storage::VersionStorage;
use super::types::{EditorInfo, RestoreOutcome, SnapshotOutcome, Version};
use super::version_store::VersionStore;
use crate::config::HistoryConfig;
use crate::crdt::NoteDoc;
use crate::diff::{DocumentDiff, compute_diff};
use crate::error::{NotesError, Result};

/// Snapshot policy and version history operations for many documents.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use live_notes_core::history::{MemoryStorage, SnapshotOutcome, SnapshotPolicy};
///
/// let policy = SnapshotPolicy::new(Arc::new(MemoryStorage::new()), Default::default());
/// policy.register_active_editor("note-1", "conn-1", "Ada", "#e91e63")?;
///
/// // Called after every applied update
/// if let SnapshotOutcome::Saved(version) = policy.maybe_snapshot("note-1", &doc, now_ms)? {
///     println!("recorded {}", version.id);
/// }
/// ```
pub struct SnapshotPolicy {
    store: VersionStore,
    config: HistoryConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SnapshotPolicy {
    /// Create a policy over a storage backend.
    pub fn new(storage: Arc<dyn VersionStorage>, config: HistoryConfig) -> Self {
        let store = VersionStore::with_max_versions(storage, config.max_versions);
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Settings the policy runs with.
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// The version store behind this policy.
    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// The critical-section lock of one document.
    fn doc_lock(&self, doc_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(doc_id.to_string()).or_default().clone()
    }

    /// Drop the lock of a document nobody is using any more.
    pub fn release(&self, doc_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(doc_id)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(doc_id);
        }
    }

    // ==================== Snapshots ====================

    /// Record the document's current state as a version, unless throttled or
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Storage failures are returned as-is. In that case no policy state was
    /// updated, so a later attempt retries cleanly.
    pub fn maybe_snapshot(
        &self,
        doc_id: &str,
        doc: &NoteDoc,
        now_ms: i64,
    ) -> Result<SnapshotOutcome> {
        let lock = self.doc_lock(doc_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.snapshot_locked(doc_id, doc, now_ms)
    }

    fn snapshot_locked(
        &self,
        doc_id: &str,
        doc: &NoteDoc,
        now_ms: i64,
    ) -> Result<SnapshotOutcome> {
        if let Some(last_save) = self.store.last_save(doc_id)?
            && now_ms - last_save < self.config.throttle_ms
        {
            debug!(
                "Snapshot of '{}' throttled ({} ms since last version)",
                doc_id,
                now_ms - last_save
            );
            return Ok(SnapshotOutcome::Throttled);
        }

        let state = doc.encode_state_as_update();
        let state_hash = fingerprint(&state);
        if self.store.last_state_hash(doc_id)?.as_deref() == Some(state_hash.as_str()) {
            debug!("Snapshot of '{}' skipped, state unchanged", doc_id);
            return Ok(SnapshotOutcome::Unchanged);
        }

        let existing = self.store.list(doc_id)?;
        let editor = self.store.last_active_user(doc_id)?;
        let version = Version {
            id: unique_version_id(&existing, now_ms),
            timestamp: now_ms,
            title: non_empty(doc.title()).unwrap_or_else(|| self.config.default_title.clone()),
            edited_by: non_empty(editor.as_ref().map(|e| e.name.clone()))
                .unwrap_or_else(|| self.config.default_editor_name.clone()),
            editor_color: non_empty(editor.map(|e| e.color))
                .unwrap_or_else(|| self.config.default_editor_color.clone()),
        };

        let policy_state = VersionStore::policy_state_ops(now_ms, &state_hash)?;
        self.store.commit(doc_id, existing, version.clone(), &state, policy_state)?;

        debug!(
            "Recorded version '{}' of '{}' ({} bytes)",
            version.id,
            doc_id,
            state.len()
        );
        Ok(SnapshotOutcome::Saved(version))
    }

    // ==================== Restore ====================

    /// Overwrite the live document with a recorded version, then attempt a
    /// snapshot so the restore itself can become a version.
    ///
    /// The snapshot attempt is still subject to the throttle window; clearing
    /// the fingerprint makes the first attempt after the window record a
    /// version even if the content happens to match the last one.
    ///
    /// # Errors
    ///
    /// - [`NotesError::MalformedInput`] for an empty version id
    /// - [`NotesError::NotFound`] if the version does not exist
    /// - storage and CRDT errors as-is
    pub fn restore_version(
        &self,
        doc_id: &str,
        version_id: &str,
        doc: &NoteDoc,
        now_ms: i64,
    ) -> Result<RestoreOutcome> {
        validate_field("version id", version_id)?;

        let lock = self.doc_lock(doc_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let blob = self.store.get_blob(doc_id, version_id)?;
        let restored = NoteDoc::from_state(&blob)?;
        self.store.clear_state_hash(doc_id)?;

        let update = doc.replace_content(&restored);
        debug!("Restored version '{}' into '{}'", version_id, doc_id);

        let snapshot = match self.snapshot_locked(doc_id, doc, now_ms) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "Snapshot after restoring '{}' into '{}' failed: {}",
                    version_id, doc_id, e
                );
                return Err(e);
            }
        };

        Ok(RestoreOutcome { update, snapshot })
    }

    // ==================== Attribution ====================

    /// Record the editor that subsequent versions are attributed to.
    ///
    /// # Errors
    ///
    /// Returns [`NotesError::MalformedInput`] (before writing anything) if
    /// any field is empty.
    pub fn register_active_editor(
        &self,
        doc_id: &str,
        editor_id: &str,
        name: &str,
        color: &str,
    ) -> Result<()> {
        validate_field("document id", doc_id)?;
        validate_field("editor id", editor_id)?;
        validate_field("editor name", name)?;
        validate_field("editor color", color)?;

        self.store
            .set_active_editor(doc_id, editor_id, &EditorInfo::new(name, color))
    }

    // ==================== Reads ====================

    /// Versions of a document, newest first.
    pub fn list_versions(&self, doc_id: &str) -> Result<Vec<Version>> {
        self.store.list(doc_id)
    }

    /// Snapshot bytes of a version.
    pub fn get_version_content(&self, doc_id: &str, version_id: &str) -> Result<Vec<u8>> {
        validate_field("version id", version_id)?;
        self.store.get_blob(doc_id, version_id)
    }

    /// Diff two recorded versions.
    pub fn diff_versions(&self, doc_id: &str, from_id: &str, to_id: &str) -> Result<DocumentDiff> {
        let from = self.get_version_content(doc_id, from_id)?;
        let to = self.get_version_content(doc_id, to_id)?;
        Ok(compute_diff(Some(&from), Some(&to)))
    }

    /// Diff a recorded version against the live document.
    pub fn diff_with_live(
        &self,
        doc_id: &str,
        from_id: &str,
        doc: &NoteDoc,
    ) -> Result<DocumentDiff> {
        let from = self.get_version_content(doc_id, from_id)?;
        let current = doc.encode_state_as_update();
        Ok(compute_diff(Some(&from), Some(&current)))
    }
}

impl std::fmt::Debug for SnapshotPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPolicy")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// `v_<now>`, suffixed with `_<n>` if that id is already taken.
fn unique_version_id(existing: &[Version], now_ms: i64) -> String {
    let base = format!("v_{}", now_ms);
    let taken = |id: &str| existing.iter().any(|v| v.id == id);
    if !taken(&base) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn validate_field(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(NotesError::MalformedInput(format!("{} is empty", field)));
    }
    Ok(())
}
