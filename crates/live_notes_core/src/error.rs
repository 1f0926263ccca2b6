use serde::Serialize;
use thiserror::Error;

/// Unified error type for live notes operations
#[derive(Debug, Error)]
pub enum NotesError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // History errors
    #[error("Version '{version_id}' not found for document '{doc_id}'")]
    NotFound { doc_id: String, version_id: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // CRDT errors
    #[error("CRDT error: {0}")]
    Crdt(String),
}

impl NotesError {
    /// Build a [`NotesError::NotFound`] for a version of a document.
    pub fn version_not_found(doc_id: &str, version_id: &str) -> Self {
        NotesError::NotFound {
            doc_id: doc_id.to_string(),
            version_id: version_id.to_string(),
        }
    }

    /// Whether this error means the requested version does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, NotesError::NotFound { .. })
    }
}

/// Result type alias for live notes operations
pub type Result<T> = std::result::Result<T, NotesError>;

/// A serializable representation of NotesError for IPC and HTTP responses
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated version id (if applicable)
    pub version_id: Option<String>,
}

impl From<&NotesError> for SerializableError {
    fn from(err: &NotesError) -> Self {
        let kind = match err {
            NotesError::Io(_) => "Io",
            NotesError::Json(_) => "Json",
            NotesError::ConfigParse(_) => "ConfigParse",
            NotesError::NotFound { .. } => "NotFound",
            NotesError::MalformedInput(_) => "MalformedInput",
            NotesError::Storage(_) => "Storage",
            #[cfg(all(not(target_arch = "wasm32"), feature = "sqlite"))]
            NotesError::Sqlite(_) => "Sqlite",
            NotesError::Crdt(_) => "Crdt",
        }
        .to_string();

        let version_id = match err {
            NotesError::NotFound { version_id, .. } => Some(version_id.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            version_id,
        }
    }
}

impl From<NotesError> for SerializableError {
    fn from(err: NotesError) -> Self {
        SerializableError::from(&err)
    }
}

impl NotesError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
