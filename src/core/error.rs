use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EffectsError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No authoritative session is connected; '{0}' was not sent")]
    AuthorityAbsent(String),
    #[error("This session holds authority but has not initialized the catalog; '{0}' was not run")]
    AuthorityNotInitialized(String),
    #[error("Unrecognized relay request: {0}")]
    UnknownRequest(String),
    #[error("Effect id '{id}' is already used by '{existing}'")]
    NameConflict { id: String, existing: String },
    #[error("Migration '{key}' failed: {reason}")]
    MigrationFailed { key: String, reason: String },
}
