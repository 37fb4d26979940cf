//! Catalog initialization and the migration runner.
//!
//! Runs on the authoritative session only, once per authority boot:
//!
//! 1. **Seed**: create live containers from the catalog generator when the
//!    recorded container ids do not name them yet.
//! 2. **Backup**: clone every live container that has no backup yet.
//! 3. **Migrate**: run registered migrations in date order, skipping keys
//!    already recorded, recording each key the moment its migration succeeds.
//!
//! A failing migration is logged and left unrecorded, so the next boot retries
//! it; migrations after it still run.

use crate::core::documents::DocumentStore;
use crate::core::error::EffectsError;
use crate::core::hub::Authority;
use crate::core::model::{Container, EffectDefinition, NewContainer};
use crate::core::settings::{self, SettingsStore};
use crate::core::store::Partition;
use crate::core::time;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One container's worth of generated catalog content.
#[derive(Debug, Clone)]
pub struct ContainerSeed {
    pub name: String,
    pub color: String,
    pub is_viewable: bool,
    pub definitions: Vec<EffectDefinition>,
}

/// Source of the predefined catalog.
pub trait CatalogGenerator: Send + Sync {
    fn containers(&self) -> Vec<ContainerSeed>;
}

/// What a migration gets to work with.
pub struct MigrationContext<'a> {
    pub docs: &'a dyn DocumentStore,
    pub settings: &'a dyn SettingsStore,
    pub generator: &'a dyn CatalogGenerator,
}

pub type MigrationFn =
    Box<dyn Fn(&MigrationContext<'_>) -> Result<(), EffectsError> + Send + Sync>;

pub struct Migration {
    /// Opaque, unique, never reused.
    pub key: String,
    /// Ordering date; registration order is irrelevant.
    pub date: NaiveDate,
    pub description: String,
    pub up: MigrationFn,
}

impl Migration {
    pub fn new<F>(key: &str, date: NaiveDate, description: &str, up: F) -> Self
    where
        F: Fn(&MigrationContext<'_>) -> Result<(), EffectsError> + Send + Sync + 'static,
    {
        Self {
            key: key.to_string(),
            date,
            description: description.to_string(),
            up: Box::new(up),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub key: String,
    pub applied_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InitReport {
    /// True when the session lacked authority and nothing ran.
    pub skipped: bool,
    pub created_containers: Vec<String>,
    pub created_backups: Vec<String>,
    pub applied: Vec<String>,
    pub already_applied: Vec<String>,
    pub failed: Vec<FailedMigration>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedMigration {
    pub key: String,
    pub reason: String,
}

pub fn applied_migrations(
    settings: &dyn SettingsStore,
) -> Result<Vec<MigrationRecord>, EffectsError> {
    settings::get_or_default(settings, settings::APPLIED_MIGRATIONS)
}

pub fn container_ids(settings: &dyn SettingsStore) -> Result<Vec<String>, EffectsError> {
    settings::get_or_default(settings, settings::EFFECT_CONTAINER_IDS)
}

/// Collapse same-id definitions inside one seed; the later one wins.
fn dedupe_last_wins(definitions: &[EffectDefinition]) -> Vec<EffectDefinition> {
    let mut out: Vec<EffectDefinition> = Vec::with_capacity(definitions.len());
    for def in definitions {
        match out.iter_mut().find(|d| d.id == def.id) {
            Some(slot) => {
                tracing::warn!(id = %def.id, name = %def.name, "duplicate effect id in catalog seed; keeping the later one");
                *slot = def.clone();
            }
            None => out.push(def.clone()),
        }
    }
    out
}

fn recorded_live_containers(ctx: &MigrationContext<'_>) -> Result<Vec<Container>, EffectsError> {
    let mut out = Vec::new();
    for id in container_ids(ctx.settings)? {
        if let Some(c) = ctx.docs.container(&id)?
            && !c.is_backup
        {
            out.push(c);
        }
    }
    Ok(out)
}

fn seed_live_containers(ctx: &MigrationContext<'_>) -> Result<Vec<String>, EffectsError> {
    let existing = recorded_live_containers(ctx)?;
    let mut ids: Vec<String> = existing.iter().map(|c| c.id.clone()).collect();
    let mut created = Vec::new();

    for (sort, seed) in ctx.generator.containers().into_iter().enumerate() {
        if existing.iter().any(|c| c.name == seed.name) {
            continue;
        }
        let container = ctx.docs.create_container(&NewContainer {
            name: seed.name.clone(),
            color: seed.color.clone(),
            is_viewable: seed.is_viewable,
            is_backup: false,
            backup_of: None,
            sort: sort as i64,
        })?;
        ctx.docs
            .create_definitions(&container.id, &dedupe_last_wins(&seed.definitions))?;
        tracing::info!(container = %seed.name, definitions = seed.definitions.len(), "catalog container created");
        ids.push(container.id.clone());
        created.push(container.id);
    }

    if !created.is_empty() {
        settings::set_typed(ctx.settings, settings::EFFECT_CONTAINER_IDS, &ids)?;
    }
    Ok(created)
}

fn backup_live_containers(ctx: &MigrationContext<'_>) -> Result<Vec<String>, EffectsError> {
    let backups = ctx.docs.containers(Partition::Backup)?;
    let mut created = Vec::new();
    for live in recorded_live_containers(ctx)? {
        if backups
            .iter()
            .any(|b| b.backup_of.as_deref() == Some(live.id.as_str()))
        {
            continue;
        }
        let backup = ctx.docs.create_container(&NewContainer {
            name: live.name.clone(),
            color: live.color.clone(),
            is_viewable: live.is_viewable,
            is_backup: true,
            backup_of: Some(live.id.clone()),
            sort: live.sort,
        })?;
        let definitions: Vec<EffectDefinition> = ctx
            .docs
            .definitions(&live.id)?
            .into_iter()
            .map(|d| d.definition)
            .collect();
        ctx.docs.create_definitions(&backup.id, &definitions)?;
        tracing::debug!(source = %live.id, backup = %backup.id, "catalog container backed up");
        created.push(backup.id);
    }
    Ok(created)
}

/// Run pending migrations in date order. Failures are reported, not returned.
pub fn run_migrations(
    ctx: &MigrationContext<'_>,
    migrations: &[Migration],
    report: &mut InitReport,
) -> Result<(), EffectsError> {
    let mut ordered: Vec<&Migration> = migrations.iter().collect();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.key.cmp(&b.key)));

    let mut applied = applied_migrations(ctx.settings)?;
    for migration in ordered {
        if applied.iter().any(|r| r.key == migration.key) {
            report.already_applied.push(migration.key.clone());
            continue;
        }
        match (migration.up)(ctx) {
            Ok(()) => {
                applied.push(MigrationRecord {
                    key: migration.key.clone(),
                    applied_at: time::now_epoch_z(),
                });
                settings::set_typed(ctx.settings, settings::APPLIED_MIGRATIONS, &applied)?;
                tracing::info!(key = %migration.key, "{}", migration.description);
                report.applied.push(migration.key.clone());
            }
            Err(err) => {
                let failure = EffectsError::MigrationFailed {
                    key: migration.key.clone(),
                    reason: err.to_string(),
                };
                tracing::error!(error = %failure, "will retry next boot");
                report.failed.push(FailedMigration {
                    key: migration.key.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Seed, back up and migrate. A no-op for sessions without authority.
pub fn initialize(
    authority: &dyn Authority,
    ctx: &MigrationContext<'_>,
    migrations: &[Migration],
) -> Result<InitReport, EffectsError> {
    if !authority.is_authority() {
        tracing::debug!("not the authority; catalog initialization skipped");
        return Ok(InitReport {
            skipped: true,
            ..InitReport::default()
        });
    }
    let mut report = InitReport {
        created_containers: seed_live_containers(ctx)?,
        created_backups: backup_live_containers(ctx)?,
        ..InitReport::default()
    };
    run_migrations(ctx, migrations, &mut report)?;
    Ok(report)
}

/// Drop every container in both partitions and seed again from the generator.
/// The migration record is left alone.
pub fn reset_catalog(
    authority: &dyn Authority,
    ctx: &MigrationContext<'_>,
) -> Result<InitReport, EffectsError> {
    if !authority.is_authority() {
        return Err(EffectsError::ValidationError(
            "only the authoritative session may reset the catalog".to_string(),
        ));
    }
    let mut ids: Vec<String> = ctx
        .docs
        .containers(Partition::Live)?
        .into_iter()
        .map(|c| c.id)
        .collect();
    ids.extend(ctx.docs.containers(Partition::Backup)?.into_iter().map(|c| c.id));
    let removed = ctx.docs.delete_containers(&ids)?;
    settings::set_typed(ctx.settings, settings::EFFECT_CONTAINER_IDS, &Vec::<String>::new())?;
    tracing::warn!(removed, "catalog reset");

    Ok(InitReport {
        created_containers: seed_live_containers(ctx)?,
        created_backups: backup_live_containers(ctx)?,
        ..InitReport::default()
    })
}
