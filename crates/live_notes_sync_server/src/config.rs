use live_notes_core::NotesError;
use live_notes_core::config::HistoryConfig;
use std::env;
use std::path::PathBuf;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 3030)
    pub port: u16,
    /// Database file path (default: ./live_notes.db)
    pub database_path: PathBuf,
    /// CORS allowed origins (comma-separated, `*` allows any)
    pub cors_origins: Vec<String>,
    /// Snapshot policy settings
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    ///
    /// `HISTORY_CONFIG` names a TOML file for the snapshot policy;
    /// `SNAPSHOT_THROTTLE_MS` and `MAX_VERSIONS` override its values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT")
            .unwrap_or_else(|| "3030".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_path = PathBuf::from(
            lookup("DATABASE_PATH").unwrap_or_else(|| "./live_notes.db".to_string()),
        );

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut history = match lookup("HISTORY_CONFIG") {
            Some(path) => {
                HistoryConfig::load_from(&PathBuf::from(path)).map_err(ConfigError::History)?
            }
            None => HistoryConfig::default(),
        };

        if let Some(value) = lookup("SNAPSHOT_THROTTLE_MS") {
            history.throttle_ms = value.parse().map_err(|_| ConfigError::InvalidThrottle)?;
        }
        if let Some(value) = lookup("MAX_VERSIONS") {
            history.max_versions = value.parse().map_err(|_| ConfigError::InvalidMaxVersions)?;
        }
        history.validate().map_err(ConfigError::History)?;

        Ok(Config {
            host,
            port,
            database_path,
            cors_origins,
            history,
        })
    }

    /// Whether any origin may call the API
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidThrottle,
    InvalidMaxVersions,
    History(NotesError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT environment variable"),
            ConfigError::InvalidThrottle => {
                write!(f, "Invalid SNAPSHOT_THROTTLE_MS environment variable")
            }
            ConfigError::InvalidMaxVersions => {
                write!(f, "Invalid MAX_VERSIONS environment variable")
            }
            ConfigError::History(e) => write!(f, "Invalid history configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::History(e) => Some(e),
            _ => None,
        }
    }
}
