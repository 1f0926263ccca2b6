//! Version history records.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Metadata of one retained historical state of a document.
///
/// Versions are created by the snapshot policy and never modified afterwards;
/// they disappear only when evicted by retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Version {
    /// Unique id, `v_<timestamp>` with a numeric suffix on collision
    pub id: String,

    /// Creation time (epoch milliseconds)
    pub timestamp: i64,

    /// Document title at creation time
    pub title: String,

    /// Name of the editor the version is attributed to
    pub edited_by: String,

    /// Display color of that editor
    pub editor_color: String,
}

/// Attribution of an editor: display name and color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EditorInfo {
    /// Display name
    pub name: String,
    /// CSS color, e.g. `#ff5722`
    pub color: String,
}

impl EditorInfo {
    /// Create editor info from a name and color.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// What a snapshot attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The previous version is younger than the throttle window.
    Throttled,
    /// The document state matches the last recorded version.
    Unchanged,
    /// A new version was recorded.
    Saved(Version),
}

impl SnapshotOutcome {
    /// Short lowercase name, as reported over the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOutcome::Throttled => "throttled",
            SnapshotOutcome::Unchanged => "unchanged",
            SnapshotOutcome::Saved(_) => "saved",
        }
    }

    /// The recorded version, if any.
    pub fn version(&self) -> Option<&Version> {
        match self {
            SnapshotOutcome::Saved(version) => Some(version),
            _ => None,
        }
    }
}

/// Result of restoring a version into a live document.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// CRDT update that overwrote the live content, to relay to peers
    pub update: Vec<u8>,

    /// The snapshot attempt made right after the restore
    pub snapshot: SnapshotOutcome,
}
