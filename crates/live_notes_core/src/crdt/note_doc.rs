//! Live note document CRDT.
//!
//! This module provides `NoteDoc`, the Y.Doc behind one collaborative note.
//! Editors write rich text into the `default` Y.XmlFragment and the note title
//! into the `meta` Y.Map; the version history only ever reads the document
//! (full-state snapshots, structural snapshots) or overwrites its content when
//! a version is restored.

use yrs::{
    Doc, Map, ReadTxn, StateVector, Transact, Update, XmlFragment, updates::decoder::Decode,
    updates::encoder::Encode,
};

use super::structure::{DocNode, DocTree, read_children, write_children};
use crate::error::{NotesError, Result};

/// Name of the Y.XmlFragment holding the rich-text content.
const CONTENT_FRAGMENT_NAME: &str = "default";

/// Name of the Y.Map holding note metadata.
const META_MAP_NAME: &str = "meta";

/// Key of the title inside the metadata map.
const TITLE_KEY: &str = "title";

/// A CRDT document for a single collaborative note.
///
/// The document contains:
/// - A Y.XmlFragment (`default`) for the rich-text block tree
/// - A Y.Map (`meta`) for metadata such as the title
///
/// # Example
///
/// ```ignore
/// use live_notes_core::crdt::{DocNode, NoteDoc};
/// use live_notes_core::diff::StyledRun;
///
/// let doc = NoteDoc::new();
/// doc.set_title("Groceries");
/// doc.push_nodes(&[DocNode::paragraph(vec![StyledRun::plain("Milk")])]);
///
/// // Replay into a fresh document
/// let copy = NoteDoc::from_state(&doc.encode_state_as_update())?;
/// assert_eq!(copy.title().as_deref(), Some("Groceries"));
/// ```
pub struct NoteDoc {
    doc: Doc,
    content: yrs::XmlFragmentRef,
    meta: yrs::MapRef,
}

impl Default for NoteDoc {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteDoc {
    /// Create a new empty note document.
    pub fn new() -> Self {
        let doc = Doc::new();
        let content = doc.get_or_insert_xml_fragment(CONTENT_FRAGMENT_NAME);
        let meta = doc.get_or_insert_map(META_MAP_NAME);
        Self { doc, content, meta }
    }

    /// Replay a full-state snapshot into a fresh document.
    ///
    /// # Errors
    ///
    /// Returns [`NotesError::Crdt`] if the snapshot cannot be decoded or applied.
    pub fn from_state(state: &[u8]) -> Result<Self> {
        let note = Self::new();
        note.apply_update(state)?;
        Ok(note)
    }

    // ==================== Sync Operations ====================

    /// Encode the full state as an update (the snapshot format).
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode the current state vector for sync.
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the diff between current state and a remote state vector.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(remote_state_vector)
            .map_err(|e| NotesError::Crdt(format!("Failed to decode state vector: {}", e)))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Apply an update from a peer (or a full snapshot).
    pub fn apply_update(&self, update: &[u8]) -> Result<()> {
        let decoded = Update::decode_v1(update)
            .map_err(|e| NotesError::Crdt(format!("Failed to decode update: {}", e)))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(decoded)
            .map_err(|e| NotesError::Crdt(format!("Failed to apply update: {}", e)))?;
        Ok(())
    }

    // ==================== Metadata ====================

    /// The note title from the metadata map, if set.
    pub fn title(&self) -> Option<String> {
        let txn = self.doc.transact();
        self.meta
            .get(&txn, TITLE_KEY)
            .and_then(|v| v.cast::<String>().ok())
    }

    /// Set the note title. Returns the incremental update.
    pub fn set_title(&self, title: &str) -> Vec<u8> {
        self.mutate(|note, txn| {
            note.meta.insert(txn, TITLE_KEY, title);
        })
    }

    // ==================== Content ====================

    /// Copy the structural content into a read-only [`DocTree`].
    pub fn structure(&self) -> DocTree {
        let txn = self.doc.transact();
        DocTree::new(read_children(&self.content, &txn))
    }

    /// Number of top-level content nodes.
    pub fn node_count(&self) -> u32 {
        let txn = self.doc.transact();
        self.content.len(&txn)
    }

    /// Append nodes to the end of the content. Returns the incremental update.
    pub fn push_nodes(&self, nodes: &[DocNode]) -> Vec<u8> {
        self.mutate(|note, txn| write_children(&note.content, txn, nodes))
    }

    /// Remove a range of top-level nodes. Returns the incremental update.
    pub fn remove_nodes(&self, index: u32, len: u32) -> Vec<u8> {
        self.mutate(|note, txn| note.content.remove_range(txn, index, len))
    }

    /// Overwrite this document's content and title with another document's.
    ///
    /// The overwrite is expressed as ordinary CRDT operations (delete all
    /// top-level nodes, then re-insert the source tree), so peers holding the
    /// current state converge on the restored content. Returns the
    /// incremental update.
    pub fn replace_content(&self, source: &NoteDoc) -> Vec<u8> {
        let tree = source.structure();
        let title = source.title();
        self.mutate(|note, txn| {
            let len = note.content.len(&*txn);
            if len > 0 {
                note.content.remove_range(txn, 0, len);
            }
            write_children(&note.content, txn, &tree.nodes);
            match &title {
                Some(title) => {
                    note.meta.insert(txn, TITLE_KEY, title.as_str());
                }
                None => {
                    note.meta.remove(txn, TITLE_KEY);
                }
            }
        })
    }

    /// Run a mutation in one transaction and return the update it produced.
    fn mutate<F>(&self, f: F) -> Vec<u8>
    where
        F: FnOnce(&Self, &mut yrs::TransactionMut),
    {
        let sv_before = {
            let txn = self.doc.transact();
            txn.state_vector()
        };

        {
            let mut txn = self.doc.transact_mut();
            f(self, &mut txn);
        }

        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&sv_before)
    }

    // ==================== Observers ====================

    /// Observe changes to the underlying document.
    ///
    /// The callback receives each committed update in v1 encoding.
    pub fn observe_updates<F>(&self, callback: F) -> Result<yrs::Subscription>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.doc
            .observe_update_v1(move |_, event| {
                callback(&event.update);
            })
            .map_err(|e| NotesError::Crdt(format!("Failed to observe document updates: {}", e)))
    }
}

impl std::fmt::Debug for NoteDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteDoc")
            .field("title", &self.title())
            .field("node_count", &self.node_count())
            .finish_non_exhaustive()
    }
}
