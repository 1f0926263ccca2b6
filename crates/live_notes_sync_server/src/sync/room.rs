use super::ClientConnection;
use chrono::Utc;
use live_notes_core::diff::DocumentDiff;
use live_notes_core::history::{EditorInfo, SnapshotOutcome, SnapshotPolicy};
use live_notes_core::{NoteDoc, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

/// An update relayed to every connection of a room.
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    /// Connection that produced the update (`None` for server-side changes)
    pub origin: Option<String>,
    /// yrs v1 update
    pub update: Vec<u8>,
}

/// Statistics about the sync state
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub active_connections: usize,
    pub active_rooms: usize,
}

/// Global sync state managing all rooms
pub struct SyncState {
    /// Map of doc_id to NoteRoom
    rooms: RwLock<HashMap<String, Arc<NoteRoom>>>,
    policy: Arc<SnapshotPolicy>,
}

impl SyncState {
    /// Create a new SyncState
    pub fn new(policy: Arc<SnapshotPolicy>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Snapshot policy shared by every room
    pub fn policy(&self) -> &Arc<SnapshotPolicy> {
        &self.policy
    }

    /// Get or create the room of a document, loading its saved state
    pub async fn get_or_create_room(&self, doc_id: &str) -> Result<Arc<NoteRoom>> {
        // Check if room exists
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(doc_id) {
                return Ok(room.clone());
            }
        }

        let mut rooms = self.rooms.write().await;
        self.room_entry(&mut rooms, doc_id)
    }

    /// Open a connection to the room of a document.
    ///
    /// The connection subscribes while the rooms map is locked, so
    /// `maybe_remove_room` either runs before (and the room is reloaded) or
    /// sees the subscription and keeps the room.
    pub async fn connect(&self, doc_id: &str, connection_id: String) -> Result<ClientConnection> {
        let mut rooms = self.rooms.write().await;
        let room = self.room_entry(&mut rooms, doc_id)?;
        Ok(ClientConnection::new(connection_id, room))
    }

    fn room_entry(
        &self,
        rooms: &mut HashMap<String, Arc<NoteRoom>>,
        doc_id: &str,
    ) -> Result<Arc<NoteRoom>> {
        if let Some(room) = rooms.get(doc_id) {
            return Ok(room.clone());
        }

        let room = match NoteRoom::load(doc_id, self.policy.clone()) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                error!("Failed to load room for {}: {}", doc_id, e);
                return Err(e);
            }
        };

        rooms.insert(doc_id.to_string(), room.clone());
        info!("Created room for note: {}", doc_id);

        Ok(room)
    }

    /// Get an existing room (does not create if not found)
    pub async fn get_room(&self, doc_id: &str) -> Option<Arc<NoteRoom>> {
        let rooms = self.rooms.read().await;
        rooms.get(doc_id).cloned()
    }

    /// Save and remove a room if it has no active connections
    pub async fn maybe_remove_room(&self, doc_id: &str) {
        let mut rooms = self.rooms.write().await;

        if let Some(room) = rooms.get(doc_id)
            && room.connection_count() == 0
        {
            if let Err(e) = room.save().await {
                // Keep the room so the state is not lost
                error!("Failed to save room {} before removal: {}", doc_id, e);
                return;
            }
            rooms.remove(doc_id);
            self.policy.release(doc_id);
            info!("Removed idle room: {}", doc_id);
        }
    }

    /// Save the live state of every room
    pub async fn save_all(&self) -> usize {
        let rooms: Vec<Arc<NoteRoom>> = self.rooms.read().await.values().cloned().collect();
        let mut saved = 0;
        for room in rooms {
            match room.save().await {
                Ok(()) => saved += 1,
                Err(e) => error!("Failed to save room {}: {}", room.doc_id(), e),
            }
        }
        saved
    }

    /// Get statistics about the sync state
    pub async fn get_stats(&self) -> SyncStats {
        let rooms = self.rooms.read().await;
        let active_connections: usize = rooms.values().map(|r| r.connection_count()).sum();

        SyncStats {
            active_connections,
            active_rooms: rooms.len(),
        }
    }
}

/// The server-side host of one live note
pub struct NoteRoom {
    doc_id: String,
    doc: RwLock<NoteDoc>,
    policy: Arc<SnapshotPolicy>,
    /// Broadcast channel for document updates
    broadcast_tx: broadcast::Sender<RoomUpdate>,
    /// Editors registered by connection id
    active_editors: RwLock<HashMap<String, EditorInfo>>,
    /// Number of active connections
    connection_count: AtomicUsize,
}

impl NoteRoom {
    /// Open a room, restoring the document saved under the `document` key
    pub fn load(doc_id: &str, policy: Arc<SnapshotPolicy>) -> Result<Self> {
        let doc = match policy.store().load_document(doc_id)? {
            Some(state) => NoteDoc::from_state(&state)?,
            None => NoteDoc::new(),
        };

        let (broadcast_tx, _) = broadcast::channel(1024);

        Ok(Self {
            doc_id: doc_id.to_string(),
            doc: RwLock::new(doc),
            policy,
            broadcast_tx,
            active_editors: RwLock::new(HashMap::new()),
            connection_count: AtomicUsize::new(0),
        })
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Subscribe to room updates
    pub fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
        self.broadcast_tx.subscribe()
    }

    /// Unsubscribe from room updates
    pub fn unsubscribe(&self) {
        self.connection_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Full document state as a single update
    pub async fn get_full_state(&self) -> Vec<u8> {
        self.doc.read().await.encode_state_as_update()
    }

    /// Apply an update from a connection, relay it, then run the snapshot
    /// policy.
    ///
    /// A malformed update is rejected before anything is relayed. A failed
    /// snapshot is returned after the relay; the live document keeps the
    /// update either way.
    pub async fn apply_update(&self, origin: &str, update: &[u8]) -> Result<SnapshotOutcome> {
        let doc = self.doc.write().await;
        doc.apply_update(update)?;

        self.relay(Some(origin), update.to_vec());

        let outcome = self.policy.maybe_snapshot(&self.doc_id, &doc, now_ms())?;
        if let SnapshotOutcome::Saved(version) = &outcome {
            debug!("Saved version {} of {}", version.id, self.doc_id);
        }
        Ok(outcome)
    }

    /// Overwrite the live document with a recorded version.
    ///
    /// The overwrite is relayed to every connection. If the snapshot after
    /// the overwrite fails, whatever changed is still relayed before the
    /// error is returned.
    pub async fn restore(&self, version_id: &str) -> Result<SnapshotOutcome> {
        let doc = self.doc.write().await;
        let state_vector = doc.encode_state_vector();

        match self
            .policy
            .restore_version(&self.doc_id, version_id, &doc, now_ms())
        {
            Ok(outcome) => {
                self.relay(None, outcome.update);
                info!(
                    "Restored {} to version {} ({})",
                    self.doc_id,
                    version_id,
                    outcome.snapshot.as_str()
                );
                Ok(outcome.snapshot)
            }
            Err(e) => {
                if doc.encode_state_vector() != state_vector {
                    match doc.encode_diff(&state_vector) {
                        Ok(update) => self.relay(None, update),
                        Err(diff_err) => warn!(
                            "Failed to encode restore of {} for peers: {}",
                            self.doc_id, diff_err
                        ),
                    }
                }
                Err(e)
            }
        }
    }

    /// Diff a recorded version against the live document
    pub async fn diff_with_live(&self, from_id: &str) -> Result<DocumentDiff> {
        let doc = self.doc.read().await;
        self.policy.diff_with_live(&self.doc_id, from_id, &doc)
    }

    /// Register the editor behind a connection for version attribution
    pub async fn register_editor(&self, connection_id: &str, editor: EditorInfo) -> Result<()> {
        self.policy
            .register_active_editor(&self.doc_id, connection_id, &editor.name, &editor.color)?;
        self.active_editors
            .write()
            .await
            .insert(connection_id.to_string(), editor);
        Ok(())
    }

    /// Forget the editor behind a closed connection
    pub async fn remove_editor(&self, connection_id: &str) -> Option<EditorInfo> {
        self.active_editors.write().await.remove(connection_id)
    }

    /// Editors of the currently open connections
    pub async fn active_editors(&self) -> HashMap<String, EditorInfo> {
        self.active_editors.read().await.clone()
    }

    /// Persist the live document state
    pub async fn save(&self) -> Result<()> {
        let state = self.doc.read().await.encode_state_as_update();
        self.policy.store().save_document(&self.doc_id, &state)
    }

    fn relay(&self, origin: Option<&str>, update: Vec<u8>) {
        // No receivers is fine
        let _ = self.broadcast_tx.send(RoomUpdate {
            origin: origin.map(str::to_string),
            update,
        });
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl std::fmt::Debug for NoteRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteRoom")
            .field("doc_id", &self.doc_id)
            .field("connection_count", &self.connection_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_notes_core::{DocNode, NotesError};
    use live_notes_core::config::HistoryConfig;
    use live_notes_core::diff::{BlockStatus, StyledRun};
    use live_notes_core::history::MemoryStorage;

    fn state_with(config: HistoryConfig) -> SyncState {
        let policy = SnapshotPolicy::new(Arc::new(MemoryStorage::new()), config);
        SyncState::new(Arc::new(policy))
    }

    fn no_throttle() -> HistoryConfig {
        HistoryConfig {
            throttle_ms: 0,
            ..HistoryConfig::default()
        }
    }

    fn paragraph(text: &str) -> DocNode {
        DocNode::paragraph(vec![StyledRun::plain(text)])
    }

    #[tokio::test]
    async fn test_update_is_relayed_and_snapshotted() {
        let state = state_with(no_throttle());
        let room = state.get_or_create_room("note").await.unwrap();
        let mut rx = room.subscribe();

        let client = NoteDoc::new();
        let update = client.push_nodes(&[paragraph("hello")]);
        let outcome = room.apply_update("conn-a", &update).await.unwrap();
        assert!(matches!(outcome, SnapshotOutcome::Saved(_)));

        let relayed = rx.recv().await.unwrap();
        assert_eq!(relayed.origin.as_deref(), Some("conn-a"));
        assert_eq!(relayed.update, update);
        assert_eq!(state.policy().list_versions("note").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_update_is_not_relayed() {
        let state = state_with(no_throttle());
        let room = state.get_or_create_room("note").await.unwrap();
        let mut rx = room.subscribe();

        let err = room.apply_update("conn-a", &[0xff, 0xff, 0xff]).await;
        assert!(err.is_err());
        assert!(rx.try_recv().is_err());
        assert!(state.policy().list_versions("note").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rooms_are_shared_per_document() {
        let state = state_with(HistoryConfig::default());
        let a = state.get_or_create_room("note").await.unwrap();
        let b = state.get_or_create_room("note").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let _rx = a.subscribe();
        let stats = state.get_stats().await;
        assert_eq!(stats.active_rooms, 1);
        assert_eq!(stats.active_connections, 1);
    }

    #[tokio::test]
    async fn test_idle_room_is_saved_and_reloaded() {
        let state = state_with(HistoryConfig::default());
        let room = state.get_or_create_room("note").await.unwrap();
        let rx = room.subscribe();

        let client = NoteDoc::new();
        room.apply_update("conn-a", &client.push_nodes(&[paragraph("kept")]))
            .await
            .unwrap();

        // Still connected
        state.maybe_remove_room("note").await;
        assert!(state.get_room("note").await.is_some());

        drop(rx);
        room.unsubscribe();
        state.maybe_remove_room("note").await;
        assert!(state.get_room("note").await.is_none());

        let reloaded = state.get_or_create_room("note").await.unwrap();
        let doc = NoteDoc::from_state(&reloaded.get_full_state().await).unwrap();
        assert_eq!(doc.structure().nodes, vec![paragraph("kept")]);
    }

    #[tokio::test]
    async fn test_connected_room_is_kept_until_last_disconnect() {
        let state = state_with(HistoryConfig::default());
        let connection = state.connect("note", "conn-a".to_string()).await.unwrap();

        state.maybe_remove_room("note").await;
        let live = state.get_room("note").await.unwrap();
        assert!(Arc::ptr_eq(connection.room(), &live));

        drop(connection);
        state.maybe_remove_room("note").await;
        assert!(state.get_room("note").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_connect_racing_room_removal_joins_the_live_room() {
        let state = Arc::new(state_with(HistoryConfig::default()));

        for round in 0..100 {
            let remover = {
                let state = state.clone();
                tokio::spawn(async move { state.maybe_remove_room("note").await })
            };
            let connection = state.connect("note", format!("conn-{round}")).await.unwrap();
            remover.await.unwrap();

            // Whoever won, the connection is on the room that stays registered
            let live = state.get_room("note").await.unwrap();
            assert!(Arc::ptr_eq(connection.room(), &live));

            let client = NoteDoc::new();
            connection
                .handle_update(&client.push_nodes(&[paragraph("edit")]))
                .await
                .unwrap();
            drop(connection);
            state.maybe_remove_room("note").await;
            assert!(state.get_room("note").await.is_none());
        }

        let saved = state.policy().store().load_document("note").unwrap().unwrap();
        assert_eq!(NoteDoc::from_state(&saved).unwrap().node_count(), 100);
    }

    #[tokio::test]
    async fn test_restore_is_relayed_to_peers() {
        let state = state_with(no_throttle());
        let room = state.get_or_create_room("note").await.unwrap();
        let peer = NoteDoc::new();

        let first = peer.push_nodes(&[paragraph("first draft")]);
        let version = match room.apply_update("peer", &first).await.unwrap() {
            SnapshotOutcome::Saved(v) => v,
            other => panic!("expected a saved version, got {:?}", other),
        };
        let second = peer.push_nodes(&[paragraph("second paragraph")]);
        room.apply_update("peer", &second).await.unwrap();

        let mut rx = room.subscribe();
        let outcome = room.restore(&version.id).await.unwrap();
        assert!(matches!(outcome, SnapshotOutcome::Saved(_)));

        let relayed = rx.recv().await.unwrap();
        assert!(relayed.origin.is_none());
        peer.apply_update(&relayed.update).unwrap();
        assert_eq!(peer.structure().nodes, vec![paragraph("first draft")]);
    }

    #[tokio::test]
    async fn test_restore_unknown_version() {
        let state = state_with(no_throttle());
        let room = state.get_or_create_room("note").await.unwrap();
        let mut rx = room.subscribe();

        let err = room.restore("v_404").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_diff_with_live() {
        let state = state_with(no_throttle());
        let room = state.get_or_create_room("note").await.unwrap();
        let client = NoteDoc::new();

        let outcome = room
            .apply_update("c", &client.push_nodes(&[paragraph("A")]))
            .await
            .unwrap();
        let version_id = outcome.version().unwrap().id.clone();
        room.apply_update("c", &client.push_nodes(&[paragraph("B")]))
            .await
            .unwrap();

        let diff = room.diff_with_live(&version_id).await.unwrap();
        let statuses: Vec<_> = diff.blocks.iter().map(|b| b.status).collect();
        assert_eq!(statuses, vec![BlockStatus::Unchanged, BlockStatus::Added]);
    }

    #[tokio::test]
    async fn test_editor_attribution() {
        let state = state_with(no_throttle());
        let room = state.get_or_create_room("note").await.unwrap();

        room.register_editor("conn-a", EditorInfo::new("Ada", "#ff5722"))
            .await
            .unwrap();
        let err = room
            .register_editor("conn-b", EditorInfo::new("", "#000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotesError::MalformedInput(_)));
        assert_eq!(room.active_editors().await.len(), 1);

        let client = NoteDoc::new();
        let outcome = room
            .apply_update("conn-a", &client.push_nodes(&[paragraph("by Ada")]))
            .await
            .unwrap();
        assert_eq!(outcome.version().unwrap().edited_by, "Ada");

        assert!(room.remove_editor("conn-a").await.is_some());
        assert!(room.active_editors().await.is_empty());
    }
}
