//! Effect identity and catalog lookups.
//!
//! An effect's id is a slug of its display name, so definitions can name each
//! other before either one exists. Lookups always state a partition and treat
//! absence as a normal outcome.

use crate::core::documents::DocumentStore;
use crate::core::error::EffectsError;
use crate::core::model::{EffectDefinition, StoredDefinition};
use crate::core::session::EffectSession;
use crate::core::store::Partition;
use crate::plugins::{references, srd};
use clap::{Parser, Subcommand};
use colored::Colorize;
use regex::Regex;
use std::sync::LazyLock;

pub const EFFECT_ID_PREFIX: &str = "ce-";

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));
static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}\-]").expect("slug pattern"));
static DASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").expect("dash pattern"));

/// Slug id for a display name: `"Exhaustion 1"` becomes `"ce-exhaustion-1"`.
///
/// Not unique: names that differ only in case, punctuation or spacing share an id.
pub fn derive_id(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let dashed = WHITESPACE.replace_all(&lowered, "-");
    let stripped = NON_SLUG.replace_all(&dashed, "");
    let collapsed = DASH_RUN.replace_all(&stripped, "-");
    format!("{}{}", EFFECT_ID_PREFIX, collapsed.trim_matches('-'))
}

/// First definition with this id, scanning containers in sort order.
pub fn find_by_id(
    docs: &dyn DocumentStore,
    id: &str,
    partition: Partition,
) -> Result<Option<StoredDefinition>, EffectsError> {
    for container in docs.containers(partition)? {
        if let Some(found) = docs
            .definitions(&container.id)?
            .into_iter()
            .find(|d| d.definition.id == id)
        {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Every definition of a partition, sorted case-insensitively by name.
pub fn find_all(
    docs: &dyn DocumentStore,
    partition: Partition,
) -> Result<Vec<StoredDefinition>, EffectsError> {
    let mut all = Vec::new();
    for container in docs.containers(partition)? {
        all.extend(docs.definitions(&container.id)?);
    }
    all.sort_by_cached_key(|d| d.definition.name.to_lowercase());
    Ok(all)
}

/// Lookup by id first, then by exact display name.
pub fn find_effect(
    docs: &dyn DocumentStore,
    id_or_name: &str,
    partition: Partition,
) -> Result<Option<StoredDefinition>, EffectsError> {
    if let Some(found) = find_by_id(docs, id_or_name, partition)? {
        return Ok(Some(found));
    }
    for container in docs.containers(partition)? {
        if let Some(found) = docs
            .definitions(&container.id)?
            .into_iter()
            .find(|d| d.definition.name == id_or_name)
        {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Rejects an id already held by another live definition. `except` names the
/// document being edited, which may keep its own id.
pub fn ensure_unique_id(
    docs: &dyn DocumentStore,
    id: &str,
    except: Option<&str>,
) -> Result<(), EffectsError> {
    for stored in find_all(docs, Partition::Live)? {
        if stored.definition.id == id && Some(stored.doc_id.as_str()) != except {
            return Err(EffectsError::NameConflict {
                id: id.to_string(),
                existing: stored.definition.name,
            });
        }
    }
    Ok(())
}

/// Add a definition to a live container. The id is re-derived from the name.
pub fn create_definition(
    docs: &dyn DocumentStore,
    container_id: &str,
    definition: EffectDefinition,
) -> Result<StoredDefinition, EffectsError> {
    let name = definition.name.clone();
    let definition = definition.renamed(&name);
    ensure_unique_id(docs, &definition.id, None)?;
    docs.create_definitions(container_id, &[definition])?
        .into_iter()
        .next()
        .ok_or_else(|| EffectsError::ValidationError("definition was not created".to_string()))
}

/// Copy a live definition into the same container under a free `"<name> (Copy)"` name.
pub fn duplicate_definition(
    docs: &dyn DocumentStore,
    doc_id: &str,
) -> Result<Option<StoredDefinition>, EffectsError> {
    let Some(source) = docs.definition(doc_id)? else {
        return Ok(None);
    };
    let taken: Vec<String> = find_all(docs, Partition::Live)?
        .into_iter()
        .map(|d| d.definition.id)
        .collect();
    let mut name = format!("{} (Copy)", source.definition.name);
    let mut n = 2;
    while taken.contains(&derive_id(&name)) {
        name = format!("{} (Copy {})", source.definition.name, n);
        n += 1;
    }
    let copy = source.definition.clone().renamed(&name);
    create_definition(docs, &source.container_id, copy).map(Some)
}

#[derive(Parser, Debug)]
#[clap(name = "catalog", about = "Browse and edit the effect catalog")]
pub struct CatalogCli {
    #[clap(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// List every definition, sorted by name.
    List {
        /// Read the backup partition instead of the live one.
        #[clap(long)]
        backup: bool,
    },
    /// Look up one definition by id or display name.
    Find {
        id_or_name: String,
        #[clap(long)]
        backup: bool,
    },
    /// Rename a live definition and rewrite every reference to it.
    Rename {
        /// Current id or display name.
        id_or_name: String,
        new_name: String,
    },
    /// Drop both partitions and seed the bundled catalog again.
    Reset,
}

fn partition_for(backup: bool) -> Partition {
    if backup { Partition::Backup } else { Partition::Live }
}

pub fn run_catalog_cli(session: &EffectSession, cli: CatalogCli) -> Result<(), EffectsError> {
    match cli.command {
        CatalogCommand::List { backup } => {
            for stored in find_all(session.docs(), partition_for(backup))? {
                let def = &stored.definition;
                let marker = if def.is_dynamic { " (dynamic)" } else { "" };
                println!("{:<28} {}{}", def.id.cyan(), def.name, marker.dimmed());
            }
        }
        CatalogCommand::Find { id_or_name, backup } => {
            match find_effect(session.docs(), &id_or_name, partition_for(backup))? {
                Some(stored) => println!("{}", serde_json::to_string_pretty(&stored)?),
                None => println!("{} no effect named '{}'", "▸".bright_yellow(), id_or_name),
            }
        }
        CatalogCommand::Rename {
            id_or_name,
            new_name,
        } => {
            let Some(stored) = find_effect(session.docs(), &id_or_name, Partition::Live)? else {
                println!("{} no effect named '{}'", "▸".bright_yellow(), id_or_name);
                return Ok(());
            };
            if let Some(report) =
                references::rename_definition(session.docs(), &stored.doc_id, &new_name)?
            {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        CatalogCommand::Reset => {
            let report = session.reset_catalog(&srd::SrdCatalog)?;
            println!("{} catalog reset", "✓".bright_green());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
