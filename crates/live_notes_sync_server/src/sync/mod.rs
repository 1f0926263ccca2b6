mod connection;
mod room;

pub use connection::ClientConnection;
pub use room::{NoteRoom, RoomUpdate, SyncState, SyncStats};
