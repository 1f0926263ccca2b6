use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use live_notes_core::NotesError;
use tracing::error;

/// A [`NotesError`] returned from an HTTP handler
#[derive(Debug)]
pub struct ApiError(pub NotesError);

impl ApiError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ApiError(NotesError::MalformedInput(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NotesError::NotFound { .. } => StatusCode::NOT_FOUND,
            NotesError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<NotesError> for ApiError {
    fn from(err: NotesError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        }
        (status, Json(self.0.to_serializable())).into_response()
    }
}
