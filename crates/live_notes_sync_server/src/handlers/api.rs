use super::error::ApiError;
use super::ws::ws_handler;
use crate::sync::SyncState;
use axum::{
    Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use live_notes_core::diff::DocumentDiff;
use live_notes_core::history::{EditorInfo, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Diff target naming the live document instead of a version
pub const CURRENT: &str = "current";

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub sync_state: Arc<SyncState>,
}

/// Server status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub active_connections: usize,
    pub active_rooms: usize,
}

/// Body of `POST /notes/{doc_id}/user`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub connection_id: String,
    pub user: EditorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub success: bool,
    /// `saved`, `throttled` or `unchanged`
    pub snapshot: String,
}

/// A version's snapshot, base64 encoded
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionContentResponse {
    pub id: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: String,
    /// Version id, or `current` (the default) for the live document
    pub to: Option<String>,
}

/// Create API routes
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/notes/{doc_id}/user", post(register_user))
        .route("/notes/{doc_id}/versions", get(list_versions))
        .route("/notes/{doc_id}/version/{version_id}", get(get_version))
        .route("/notes/{doc_id}/restore/{version_id}", post(restore_version))
        .route("/notes/{doc_id}/diff", get(diff))
        .route("/notes/{doc_id}/ws", get(ws_handler))
        .with_state(state)
}

/// GET /api/status - Get server status
async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.sync_state.get_stats().await;

    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_connections: stats.active_connections,
        active_rooms: stats.active_rooms,
    })
}

/// POST /api/notes/{doc_id}/user - Register the editor behind a connection
async fn register_user(
    State(state): State<ApiState>,
    Path(doc_id): Path<String>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::malformed(e.body_text()))?;

    match state.sync_state.get_room(&doc_id).await {
        Some(room) => {
            room.register_editor(&request.connection_id, request.user)
                .await?
        }
        None => state.sync_state.policy().register_active_editor(
            &doc_id,
            &request.connection_id,
            &request.user.name,
            &request.user.color,
        )?,
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/notes/{doc_id}/versions - Versions, newest first
async fn list_versions(
    State(state): State<ApiState>,
    Path(doc_id): Path<String>,
) -> Result<Json<Vec<Version>>, ApiError> {
    Ok(Json(state.sync_state.policy().list_versions(&doc_id)?))
}

/// GET /api/notes/{doc_id}/version/{version_id} - Snapshot of one version
async fn get_version(
    State(state): State<ApiState>,
    Path((doc_id, version_id)): Path<(String, String)>,
) -> Result<Json<VersionContentResponse>, ApiError> {
    let blob = state
        .sync_state
        .policy()
        .get_version_content(&doc_id, &version_id)?;

    Ok(Json(VersionContentResponse {
        id: version_id,
        state: STANDARD.encode(blob),
    }))
}

/// POST /api/notes/{doc_id}/restore/{version_id} - Restore a version into the
/// live document
async fn restore_version(
    State(state): State<ApiState>,
    Path((doc_id, version_id)): Path<(String, String)>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let connection = state.sync_state.connect(&doc_id, api_connection_id()).await?;
    let result = connection.room().restore(&version_id).await;

    // Persist right away when nobody else is connected
    drop(connection);
    state.sync_state.maybe_remove_room(&doc_id).await;

    let snapshot = result?;
    info!("Restore of {} via API: {}", doc_id, snapshot.as_str());

    Ok(Json(RestoreResponse {
        success: true,
        snapshot: snapshot.as_str().to_string(),
    }))
}

/// GET /api/notes/{doc_id}/diff?from=..&to=.. - Structural diff
async fn diff(
    State(state): State<ApiState>,
    Path(doc_id): Path<String>,
    Query(query): Query<DiffQuery>,
) -> Result<Json<DocumentDiff>, ApiError> {
    let to = query.to.as_deref().unwrap_or(CURRENT);
    if to != CURRENT {
        let diff = state
            .sync_state
            .policy()
            .diff_versions(&doc_id, &query.from, to)?;
        return Ok(Json(diff));
    }

    let connection = state.sync_state.connect(&doc_id, api_connection_id()).await?;
    let result = connection.room().diff_with_live(&query.from).await;
    drop(connection);
    state.sync_state.maybe_remove_room(&doc_id).await;

    Ok(Json(result?))
}

/// Connection id held by an API request while it works on a room
fn api_connection_id() -> String {
    format!("api-{}", Uuid::new_v4())
}
