//! Configuration for version history.
//!
//! [`HistoryConfig`] holds the snapshot policy's tunables. It is plain serde
//! data, so a server can load it from a TOML file and fall back to
//! [`HistoryConfig::default`] for any field that is not set.
//!
//! # Example
//!
//! ```ignore
//! use live_notes_core::config::HistoryConfig;
//!
//! let config = HistoryConfig::from_toml_str("throttle_ms = 10000")?;
//! assert_eq!(config.throttle_ms, 10_000);
//! assert_eq!(config.max_versions, 100);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NotesError, Result};

/// Minimum time between two recorded versions of a document.
pub const DEFAULT_THROTTLE_MS: i64 = 5_000;

/// Number of versions retained per document.
pub const DEFAULT_MAX_VERSIONS: usize = 100;

/// Title recorded for documents without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Editor recorded when nobody has registered yet.
pub const DEFAULT_EDITOR_NAME: &str = "Unknown";

/// Neutral gray for the default editor.
pub const DEFAULT_EDITOR_COLOR: &str = "#888888";

/// Tunables of the snapshot policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Throttle window in milliseconds
    pub throttle_ms: i64,

    /// Maximum number of versions kept per document (oldest evicted first)
    pub max_versions: usize,

    /// Title used when the document's metadata has none
    pub default_title: String,

    /// Attribution used when no editor has registered
    pub default_editor_name: String,

    /// Color paired with [`HistoryConfig::default_editor_name`]
    pub default_editor_color: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            throttle_ms: DEFAULT_THROTTLE_MS,
            max_versions: DEFAULT_MAX_VERSIONS,
            default_title: DEFAULT_TITLE.to_string(),
            default_editor_name: DEFAULT_EDITOR_NAME.to_string(),
            default_editor_color: DEFAULT_EDITOR_COLOR.to_string(),
        }
    }
}

impl HistoryConfig {
    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: HistoryConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Load a TOML config file, or return the defaults if it does not exist.
    pub fn load_from_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the policy cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.throttle_ms < 0 {
            return Err(NotesError::MalformedInput(format!(
                "throttle_ms must not be negative (got {})",
                self.throttle_ms
            )));
        }
        if self.max_versions == 0 {
            return Err(NotesError::MalformedInput(
                "max_versions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
