//! Centralized database schema definitions for the world database.
//!
//! One SQLite database (`world.db`) stands in for the host's document store:
//! 1. settings: opaque key/value JSON (container ids, applied migrations).
//! 2. containers + definitions: the effect catalog, live and backup partitions.
//! 3. actors + applied_effects: character records and their materialized effects.

pub const WORLD_DB_NAME: &str = "world.db";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";
pub const WORLD_SCHEMA_VERSION: u32 = 2;

pub const WORLD_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const WORLD_DB_SCHEMA_SETTINGS: &str = "
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL, -- JSON
        updated_at TEXT NOT NULL
    )
";

pub const WORLD_DB_SCHEMA_CONTAINERS: &str = "
    CREATE TABLE IF NOT EXISTS containers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        color TEXT NOT NULL DEFAULT '',
        is_viewable INTEGER NOT NULL DEFAULT 1,
        is_backup INTEGER NOT NULL DEFAULT 0,
        backup_of TEXT,
        sort INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
";
pub const WORLD_DB_SCHEMA_INDEX_CONTAINERS_BACKUP: &str =
    "CREATE INDEX IF NOT EXISTS idx_containers_backup ON containers(is_backup, sort)";

pub const WORLD_DB_SCHEMA_DEFINITIONS: &str = "
    CREATE TABLE IF NOT EXISTS definitions (
        doc_id TEXT PRIMARY KEY,
        container_id TEXT NOT NULL,
        effect_id TEXT NOT NULL,
        name TEXT NOT NULL,
        sort INTEGER NOT NULL DEFAULT 0,
        payload TEXT NOT NULL, -- JSON EffectDefinition
        updated_at TEXT NOT NULL,
        FOREIGN KEY(container_id) REFERENCES containers(id) ON DELETE CASCADE
    )
";
pub const WORLD_DB_SCHEMA_INDEX_DEFINITIONS_CONTAINER: &str =
    "CREATE INDEX IF NOT EXISTS idx_definitions_container ON definitions(container_id, sort)";
pub const WORLD_DB_SCHEMA_INDEX_DEFINITIONS_EFFECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_definitions_effect ON definitions(effect_id)";

pub const WORLD_DB_SCHEMA_ACTORS: &str = "
    CREATE TABLE IF NOT EXISTS actors (
        uuid TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        data TEXT NOT NULL DEFAULT '{}', -- JSON system data
        created_at TEXT NOT NULL
    )
";

pub const WORLD_DB_SCHEMA_APPLIED_EFFECTS: &str = "
    CREATE TABLE IF NOT EXISTS applied_effects (
        id TEXT PRIMARY KEY,
        target_uuid TEXT NOT NULL,
        effect_id TEXT NOT NULL,
        name TEXT NOT NULL,
        origin TEXT,
        disabled INTEGER NOT NULL DEFAULT 0,
        is_convenient INTEGER NOT NULL DEFAULT 1,
        overlay INTEGER NOT NULL DEFAULT 0,
        seq INTEGER NOT NULL,
        payload TEXT NOT NULL, -- JSON EffectDefinition as materialized
        created_at TEXT NOT NULL,
        FOREIGN KEY(target_uuid) REFERENCES actors(uuid) ON DELETE CASCADE
    )
";
pub const WORLD_DB_SCHEMA_INDEX_APPLIED_TARGET: &str =
    "CREATE INDEX IF NOT EXISTS idx_applied_target ON applied_effects(target_uuid, seq)";
pub const WORLD_DB_SCHEMA_INDEX_APPLIED_ORIGIN: &str =
    "CREATE INDEX IF NOT EXISTS idx_applied_origin ON applied_effects(target_uuid, origin)";
