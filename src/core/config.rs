//! Session configuration loaded from `<store>/effectsync.toml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.

use crate::core::error::EffectsError;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::fs;

pub const CONFIG_FILE_NAME: &str = "effectsync.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EffectsConfig {
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Display name of the local session, used as the audit actor.
    pub name: String,
    /// Whether the local CLI session connects with elevated authority.
    pub authority: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "gamemaster".to_string(),
            authority: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `EFFECTSYNC_LOG` wins when set.
    pub filter: String,
    /// Append broker events to `broker.events.jsonl`.
    pub audit: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            audit: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// How many executed request ids the authority remembers for redelivery drops.
    pub dedupe_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            dedupe_capacity: 1024,
        }
    }
}

/// Load the config for a store. No file means defaults (not an error).
pub fn load_config(store: &Store) -> Result<EffectsConfig, EffectsError> {
    let path = store.config_path();
    if !path.exists() {
        return Ok(EffectsConfig::default());
    }
    let content = fs::read_to_string(&path).map_err(EffectsError::IoError)?;
    let config: EffectsConfig = toml::from_str(&content)?;
    Ok(config)
}
