use super::{NoteRoom, RoomUpdate};
use live_notes_core::Result;
use live_notes_core::history::SnapshotOutcome;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Represents a connected client
pub struct ClientConnection {
    pub connection_id: String,
    room: Arc<NoteRoom>,
    broadcast_rx: broadcast::Receiver<RoomUpdate>,
}

impl ClientConnection {
    /// Create a new client connection
    pub fn new(connection_id: String, room: Arc<NoteRoom>) -> Self {
        let broadcast_rx = room.subscribe();

        Self {
            connection_id,
            room,
            broadcast_rx,
        }
    }

    pub fn room(&self) -> &Arc<NoteRoom> {
        &self.room
    }

    /// Get the initial sync message (full state)
    pub async fn get_initial_sync(&self) -> Vec<u8> {
        self.room.get_full_state().await
    }

    /// Handle an update sent by this client
    pub async fn handle_update(&self, update: &[u8]) -> Result<SnapshotOutcome> {
        self.room.apply_update(&self.connection_id, update).await
    }

    /// Receive the next update produced elsewhere (other clients or a restore)
    pub async fn recv_broadcast(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.broadcast_rx.recv().await {
                Ok(msg) if msg.origin.as_deref() == Some(self.connection_id.as_str()) => continue,
                Ok(msg) => return Some(msg.update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        "Client {} lagged {} messages, sending full state",
                        self.connection_id, n
                    );
                    // Return full state when client lags
                    return Some(self.room.get_full_state().await);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.room.unsubscribe();
        debug!(
            "Client disconnected: connection={}, note={}",
            self.connection_id,
            self.room.doc_id()
        );
    }
}
