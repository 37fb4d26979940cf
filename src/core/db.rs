use crate::core::broker::DbBroker;
use crate::core::error::EffectsError;
use crate::core::schemas;
use crate::core::store::Store;
use rusqlite::{Connection, OptionalExtension};
use std::fs;

pub fn db_connect(db_path: &str) -> Result<Connection, EffectsError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(EffectsError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(EffectsError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(EffectsError::RusqliteError)?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> Result<(), EffectsError> {
    conn.execute(schemas::WORLD_DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::WORLD_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute(schemas::WORLD_DB_SCHEMA_SETTINGS, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_CONTAINERS, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_INDEX_CONTAINERS_BACKUP, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_DEFINITIONS, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_INDEX_DEFINITIONS_CONTAINER, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_INDEX_DEFINITIONS_EFFECT, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_ACTORS, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_APPLIED_EFFECTS, [])?;
    conn.execute(schemas::WORLD_DB_SCHEMA_INDEX_APPLIED_TARGET, [])?;

    if current_version < 2 {
        // Cascade lookups filter by origin within one target.
        conn.execute(schemas::WORLD_DB_SCHEMA_INDEX_APPLIED_ORIGIN, [])?;
    }

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::WORLD_SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn initialize_world_db(store: &Store) -> Result<(), EffectsError> {
    fs::create_dir_all(&store.root).map_err(EffectsError::IoError)?;

    let broker = DbBroker::new(store, true);
    broker.with_conn("effectsync", "world.init", ensure_schema)?;

    tracing::debug!(path = %store.db_path().display(), "world database ready");
    Ok(())
}
