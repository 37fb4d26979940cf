//! Persisted key/value settings.
//!
//! Values are opaque JSON. Typed accessors for the keys the core owns live
//! next to the component that owns them (container ids in the migration
//! runner, applied migrations likewise).

use crate::core::broker::DbBroker;
use crate::core::error::EffectsError;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

pub const EFFECT_CONTAINER_IDS: &str = "effectContainerIds";
pub const APPLIED_MIGRATIONS: &str = "appliedMigrations";

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, EffectsError>;
    fn set(&self, key: &str, value: JsonValue) -> Result<(), EffectsError>;
}

/// Typed read; a missing key reads as `T::default()`.
pub fn get_or_default<T>(settings: &dyn SettingsStore, key: &str) -> Result<T, EffectsError>
where
    T: DeserializeOwned + Default,
{
    match settings.get(key)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(T::default()),
    }
}

pub fn set_typed<T: Serialize>(
    settings: &dyn SettingsStore,
    key: &str,
    value: &T,
) -> Result<(), EffectsError> {
    settings.set(key, serde_json::to_value(value)?)
}

pub struct SqliteSettings {
    broker: DbBroker,
    actor: String,
}

impl SqliteSettings {
    pub fn new(store: &Store, actor: &str, audit: bool) -> Self {
        Self {
            broker: DbBroker::new(store, audit),
            actor: actor.to_string(),
        }
    }
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str) -> Result<Option<JsonValue>, EffectsError> {
        let raw: Option<String> = self.broker.with_conn(&self.actor, "settings.get", |conn| {
            Ok(conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?)
        })?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<(), EffectsError> {
        let raw = serde_json::to_string(&value)?;
        self.broker.with_conn(&self.actor, "settings.set", |conn| {
            conn.execute(
                "INSERT INTO settings(key, value, updated_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
                params![key, raw, time::now_epoch_z()],
            )?;
            Ok(())
        })
    }
}
