use super::api::ApiState;
use crate::sync::ClientConnection;
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use live_notes_core::history::SnapshotOutcome;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Connection id used for editor attribution (generated when absent)
    pub connection_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<ApiState>,
    Path(doc_id): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let connection_id = query
        .connection_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        "WebSocket upgrade: note={}, connection={}",
        doc_id, connection_id
    );

    // Subscribe before the upgrade so the room is not removed in between
    let connection = match state.sync_state.connect(&doc_id, connection_id).await {
        Ok(connection) => connection,
        Err(e) => {
            error!("Failed to open note {}: {}", doc_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, connection))
        .into_response()
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: ApiState, mut connection: ClientConnection) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let doc_id = connection.room().doc_id().to_string();
    let connection_id = connection.connection_id.clone();

    info!(
        "WebSocket connected: note={}, connection={}, connections={}",
        doc_id,
        connection_id,
        connection.room().connection_count()
    );

    // Send initial sync (full state)
    let initial_state = connection.get_initial_sync().await;
    if let Err(e) = ws_tx.send(Message::Binary(initial_state.into())).await {
        error!("Failed to send initial state: {}", e);
        close(&state, connection, &doc_id).await;
        return;
    }

    loop {
        tokio::select! {
            // Updates from this client
            Some(msg) = ws_rx.next() => {
                match msg {
                    Ok(Message::Binary(data)) => {
                        match connection.handle_update(&data).await {
                            Ok(SnapshotOutcome::Saved(version)) => {
                                debug!("Version {} recorded for {}", version.id, doc_id);
                            }
                            Ok(_) => {}
                            Err(e) => warn!(
                                "Update from {} on {} failed: {}",
                                connection_id, doc_id, e
                            ),
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Client requested close");
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Updates from other clients and restores
            Some(update) = connection.recv_broadcast() => {
                if let Err(e) = ws_tx.send(Message::Binary(update.into())).await {
                    error!("Failed to send broadcast: {}", e);
                    break;
                }
            }

            else => break,
        }
    }

    close(&state, connection, &doc_id).await;
}

async fn close(state: &ApiState, connection: ClientConnection, doc_id: &str) {
    let connection_id = connection.connection_id.clone();
    connection.room().remove_editor(&connection_id).await;

    // Dropping the connection unsubscribes it from the room
    drop(connection);

    info!(
        "WebSocket disconnected: note={}, connection={}",
        doc_id, connection_id
    );

    state.sync_state.maybe_remove_room(doc_id).await;
}
