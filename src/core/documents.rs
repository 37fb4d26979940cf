//! Host document database primitives.
//!
//! The core never talks to SQLite directly: it goes through [`DocumentStore`],
//! whose calls are each atomic and are the only durability boundary.
//! [`SqliteDocuments`] binds the trait to the world database through the broker.

use crate::core::broker::DbBroker;
use crate::core::error::EffectsError;
use crate::core::model::{
    ActorRecord, AppliedEffectInstance, Container, EffectDefinition, NewContainer, NewInstance,
    StoredDefinition,
};
use crate::core::store::{Partition, Store};
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};

pub trait DocumentStore: Send + Sync {
    /// Containers of one partition, in sort order.
    fn containers(&self, partition: Partition) -> Result<Vec<Container>, EffectsError>;
    fn container(&self, id: &str) -> Result<Option<Container>, EffectsError>;
    fn create_container(&self, new: &NewContainer) -> Result<Container, EffectsError>;
    /// Deletes containers together with the definitions they own.
    fn delete_containers(&self, ids: &[String]) -> Result<usize, EffectsError>;

    /// Definitions of one container, in sort order.
    fn definitions(&self, container_id: &str) -> Result<Vec<StoredDefinition>, EffectsError>;
    fn definition(&self, doc_id: &str) -> Result<Option<StoredDefinition>, EffectsError>;
    fn create_definitions(
        &self,
        container_id: &str,
        definitions: &[EffectDefinition],
    ) -> Result<Vec<StoredDefinition>, EffectsError>;
    /// Replaces the payload of every listed document in one batch.
    fn update_definitions(&self, updates: &[StoredDefinition]) -> Result<(), EffectsError>;
    fn delete_definitions(&self, doc_ids: &[String]) -> Result<usize, EffectsError>;

    fn actor(&self, uuid: &str) -> Result<Option<ActorRecord>, EffectsError>;
    fn create_actor(
        &self,
        name: &str,
        data: serde_json::Value,
    ) -> Result<ActorRecord, EffectsError>;

    /// Every effect embedded on a record, oldest first. Missing record reads as empty.
    fn applied_effects(&self, target_uuid: &str)
    -> Result<Vec<AppliedEffectInstance>, EffectsError>;
    fn create_applied_effects(
        &self,
        target_uuid: &str,
        payloads: &[NewInstance],
    ) -> Result<Vec<AppliedEffectInstance>, EffectsError>;
    fn delete_applied_effects(&self, target_uuid: &str, ids: &[String])
    -> Result<usize, EffectsError>;
    fn update_applied_effect(&self, instance: &AppliedEffectInstance) -> Result<(), EffectsError>;
}

pub struct SqliteDocuments {
    broker: DbBroker,
    actor: String,
}

impl SqliteDocuments {
    pub fn new(store: &Store, actor: &str, audit: bool) -> Self {
        Self {
            broker: DbBroker::new(store, audit),
            actor: actor.to_string(),
        }
    }

    pub fn broker(&self) -> &DbBroker {
        &self.broker
    }
}

fn read_containers(
    conn: &Connection,
    where_clause: &str,
    arg: &dyn rusqlite::ToSql,
) -> Result<Vec<Container>, EffectsError> {
    let sql = format!(
        "SELECT id, name, color, is_viewable, is_backup, backup_of, sort FROM containers
         WHERE {} ORDER BY sort, id",
        where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([arg], |row| {
        Ok(Container {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            is_viewable: row.get(3)?,
            is_backup: row.get(4)?,
            backup_of: row.get(5)?,
            sort: row.get(6)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn read_definitions(
    conn: &Connection,
    where_clause: &str,
    arg: &str,
) -> Result<Vec<StoredDefinition>, EffectsError> {
    let sql = format!(
        "SELECT doc_id, container_id, sort, payload FROM definitions
         WHERE {} ORDER BY sort, doc_id",
        where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([arg], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for r in rows {
        let (doc_id, container_id, sort, payload) = r?;
        out.push(StoredDefinition {
            doc_id,
            container_id,
            sort,
            definition: serde_json::from_str(&payload)?,
        });
    }
    Ok(out)
}

fn read_instances(conn: &Connection, target_uuid: &str) -> Result<Vec<AppliedEffectInstance>, EffectsError> {
    let mut stmt = conn.prepare(
        "SELECT id, target_uuid, effect_id, name, origin, disabled, is_convenient, overlay, payload, created_at
         FROM applied_effects WHERE target_uuid = ?1 ORDER BY seq, id",
    )?;
    let rows = stmt.query_map([target_uuid], |row| {
        Ok((
            AppliedEffectInstance {
                id: row.get(0)?,
                target_uuid: row.get(1)?,
                effect_id: row.get(2)?,
                name: row.get(3)?,
                origin: row.get(4)?,
                disabled: row.get(5)?,
                is_convenient: row.get(6)?,
                overlay: row.get(7)?,
                payload: EffectDefinition::new(""),
                created_at: row.get(9)?,
            },
            row.get::<_, String>(8)?,
        ))
    })?;
    let mut out = Vec::new();
    for r in rows {
        let (mut instance, payload) = r?;
        instance.payload = serde_json::from_str(&payload)?;
        out.push(instance);
    }
    Ok(out)
}

fn placeholders(n: usize, offset: usize) -> String {
    (0..n)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

impl DocumentStore for SqliteDocuments {
    fn containers(&self, partition: Partition) -> Result<Vec<Container>, EffectsError> {
        self.broker
            .with_conn(&self.actor, "containers.list", |conn| {
                read_containers(conn, "is_backup = ?1", &partition.is_backup())
            })
    }

    fn container(&self, id: &str) -> Result<Option<Container>, EffectsError> {
        self.broker.with_conn(&self.actor, "containers.get", |conn| {
            Ok(read_containers(conn, "id = ?1", &id)?.into_iter().next())
        })
    }

    fn create_container(&self, new: &NewContainer) -> Result<Container, EffectsError> {
        let container = Container {
            id: time::new_id(),
            name: new.name.clone(),
            color: new.color.clone(),
            is_viewable: new.is_viewable,
            is_backup: new.is_backup,
            backup_of: new.backup_of.clone(),
            sort: new.sort,
        };
        self.broker
            .with_conn(&self.actor, "containers.create", |conn| {
                conn.execute(
                    "INSERT INTO containers(id, name, color, is_viewable, is_backup, backup_of, sort, created_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        container.id,
                        container.name,
                        container.color,
                        container.is_viewable,
                        container.is_backup,
                        container.backup_of,
                        container.sort,
                        time::now_epoch_z()
                    ],
                )?;
                Ok(())
            })?;
        Ok(container)
    }

    fn delete_containers(&self, ids: &[String]) -> Result<usize, EffectsError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.broker.with_tx(&self.actor, "containers.delete", |conn| {
            let list = placeholders(ids.len(), 1);
            conn.execute(
                &format!("DELETE FROM definitions WHERE container_id IN ({})", list),
                rusqlite::params_from_iter(ids.iter()),
            )?;
            let n = conn.execute(
                &format!("DELETE FROM containers WHERE id IN ({})", list),
                rusqlite::params_from_iter(ids.iter()),
            )?;
            Ok(n)
        })
    }

    fn definitions(&self, container_id: &str) -> Result<Vec<StoredDefinition>, EffectsError> {
        self.broker.with_conn(&self.actor, "definitions.list", |conn| {
            read_definitions(conn, "container_id = ?1", container_id)
        })
    }

    fn definition(&self, doc_id: &str) -> Result<Option<StoredDefinition>, EffectsError> {
        self.broker.with_conn(&self.actor, "definitions.get", |conn| {
            Ok(read_definitions(conn, "doc_id = ?1", doc_id)?
                .into_iter()
                .next())
        })
    }

    fn create_definitions(
        &self,
        container_id: &str,
        definitions: &[EffectDefinition],
    ) -> Result<Vec<StoredDefinition>, EffectsError> {
        self.broker.with_tx(&self.actor, "definitions.create", |conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT id FROM containers WHERE id = ?1",
                    [container_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(EffectsError::NotFound(format!("container {}", container_id)));
            }
            let mut next_sort: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort), -1) + 1 FROM definitions WHERE container_id = ?1",
                [container_id],
                |row| row.get(0),
            )?;
            let now = time::now_epoch_z();
            let mut out = Vec::with_capacity(definitions.len());
            for definition in definitions {
                let stored = StoredDefinition {
                    doc_id: time::new_id(),
                    container_id: container_id.to_string(),
                    sort: next_sort,
                    definition: definition.clone(),
                };
                conn.execute(
                    "INSERT INTO definitions(doc_id, container_id, effect_id, name, sort, payload, updated_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        stored.doc_id,
                        stored.container_id,
                        definition.id,
                        definition.name,
                        stored.sort,
                        serde_json::to_string(definition)?,
                        now
                    ],
                )?;
                next_sort += 1;
                out.push(stored);
            }
            Ok(out)
        })
    }

    fn update_definitions(&self, updates: &[StoredDefinition]) -> Result<(), EffectsError> {
        if updates.is_empty() {
            return Ok(());
        }
        self.broker.with_tx(&self.actor, "definitions.update", |conn| {
            let now = time::now_epoch_z();
            for stored in updates {
                let n = conn.execute(
                    "UPDATE definitions SET effect_id = ?2, name = ?3, payload = ?4, updated_at = ?5
                     WHERE doc_id = ?1",
                    params![
                        stored.doc_id,
                        stored.definition.id,
                        stored.definition.name,
                        serde_json::to_string(&stored.definition)?,
                        now
                    ],
                )?;
                if n == 0 {
                    return Err(EffectsError::NotFound(format!("definition {}", stored.doc_id)));
                }
            }
            Ok(())
        })
    }

    fn delete_definitions(&self, doc_ids: &[String]) -> Result<usize, EffectsError> {
        if doc_ids.is_empty() {
            return Ok(0);
        }
        self.broker.with_tx(&self.actor, "definitions.delete", |conn| {
            Ok(conn.execute(
                &format!(
                    "DELETE FROM definitions WHERE doc_id IN ({})",
                    placeholders(doc_ids.len(), 1)
                ),
                rusqlite::params_from_iter(doc_ids.iter()),
            )?)
        })
    }

    fn actor(&self, uuid: &str) -> Result<Option<ActorRecord>, EffectsError> {
        let row = self.broker.with_conn(&self.actor, "actors.get", |conn| {
            Ok(conn
                .query_row(
                    "SELECT uuid, name, data FROM actors WHERE uuid = ?1",
                    [uuid],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?)
        })?;
        match row {
            Some((uuid, name, data)) => Ok(Some(ActorRecord {
                uuid,
                name,
                data: serde_json::from_str(&data)?,
            })),
            None => Ok(None),
        }
    }

    fn create_actor(
        &self,
        name: &str,
        data: serde_json::Value,
    ) -> Result<ActorRecord, EffectsError> {
        let actor = ActorRecord {
            uuid: format!("Actor.{}", time::new_id()),
            name: name.to_string(),
            data,
        };
        self.broker.with_conn(&self.actor, "actors.create", |conn| {
            conn.execute(
                "INSERT INTO actors(uuid, name, data, created_at) VALUES(?1, ?2, ?3, ?4)",
                params![
                    actor.uuid,
                    actor.name,
                    serde_json::to_string(&actor.data)?,
                    time::now_epoch_z()
                ],
            )?;
            Ok(())
        })?;
        Ok(actor)
    }

    fn applied_effects(
        &self,
        target_uuid: &str,
    ) -> Result<Vec<AppliedEffectInstance>, EffectsError> {
        self.broker.with_conn(&self.actor, "effects.list", |conn| {
            read_instances(conn, target_uuid)
        })
    }

    fn create_applied_effects(
        &self,
        target_uuid: &str,
        payloads: &[NewInstance],
    ) -> Result<Vec<AppliedEffectInstance>, EffectsError> {
        self.broker.with_tx(&self.actor, "effects.create", |conn| {
            let mut seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM applied_effects WHERE target_uuid = ?1",
                [target_uuid],
                |row| row.get(0),
            )?;
            let now = time::now_epoch_z();
            let mut out = Vec::with_capacity(payloads.len());
            for new in payloads {
                let instance = AppliedEffectInstance {
                    id: new.id.clone(),
                    target_uuid: target_uuid.to_string(),
                    effect_id: new.payload.id.clone(),
                    name: new.payload.name.clone(),
                    origin: new.origin.clone(),
                    disabled: false,
                    is_convenient: new.is_convenient,
                    overlay: new.overlay,
                    payload: new.payload.clone(),
                    created_at: now.clone(),
                };
                conn.execute(
                    "INSERT INTO applied_effects(id, target_uuid, effect_id, name, origin, disabled, is_convenient, overlay, seq, payload, created_at)
                     VALUES(?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        instance.id,
                        instance.target_uuid,
                        instance.effect_id,
                        instance.name,
                        instance.origin,
                        instance.is_convenient,
                        instance.overlay,
                        seq,
                        serde_json::to_string(&instance.payload)?,
                        instance.created_at
                    ],
                )?;
                seq += 1;
                out.push(instance);
            }
            Ok(out)
        })
    }

    fn delete_applied_effects(
        &self,
        target_uuid: &str,
        ids: &[String],
    ) -> Result<usize, EffectsError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.broker.with_tx(&self.actor, "effects.delete", |conn| {
            let sql = format!(
                "DELETE FROM applied_effects WHERE target_uuid = ?1 AND id IN ({})",
                placeholders(ids.len(), 2)
            );
            let mut args: Vec<&str> = Vec::with_capacity(ids.len() + 1);
            args.push(target_uuid);
            args.extend(ids.iter().map(String::as_str));
            Ok(conn.execute(&sql, rusqlite::params_from_iter(args))?)
        })
    }

    fn update_applied_effect(&self, instance: &AppliedEffectInstance) -> Result<(), EffectsError> {
        self.broker.with_conn(&self.actor, "effects.update", |conn| {
            let n = conn.execute(
                "UPDATE applied_effects SET disabled = ?3, overlay = ?4, payload = ?5
                 WHERE target_uuid = ?1 AND id = ?2",
                params![
                    instance.target_uuid,
                    instance.id,
                    instance.disabled,
                    instance.overlay,
                    serde_json::to_string(&instance.payload)?
                ],
            )?;
            if n == 0 {
                return Err(EffectsError::NotFound(format!("effect {}", instance.id)));
            }
            Ok(())
        })
    }
}
