//! Reference graph integrity.
//!
//! Definitions point at each other through three id lists (nested, sub, other).
//! Ids derive from names, so a rename changes an id and every live referrer
//! must be rewritten. Backups keep whatever ids they were cloned with.

use crate::core::documents::DocumentStore;
use crate::core::error::EffectsError;
use crate::core::model::{EffectDefinition, StoredDefinition};
use crate::core::store::Partition;
use crate::plugins::catalog;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenameReport {
    pub doc_id: String,
    pub old_id: String,
    pub new_id: String,
    /// Other definitions whose reference lists were rewritten.
    pub rewritten: Vec<String>,
}

fn replace_in(ids: &mut [String], old_id: &str, new_id: &str) -> bool {
    let mut changed = false;
    for id in ids.iter_mut().filter(|id| id.as_str() == old_id) {
        *id = new_id.to_string();
        changed = true;
    }
    changed
}

/// Point every reference at `old_id` to `new_id`, in place, list by list.
/// Returns only the definitions that changed. Order and duplicates are kept.
pub fn rewrite_references(
    definitions: &[StoredDefinition],
    old_id: &str,
    new_id: &str,
) -> Vec<StoredDefinition> {
    if old_id == new_id {
        return Vec::new();
    }
    definitions
        .iter()
        .filter_map(|stored| {
            let mut def = stored.definition.clone();
            let changed = replace_in(&mut def.nested_effect_ids, old_id, new_id)
                | replace_in(&mut def.sub_effect_ids, old_id, new_id)
                | replace_in(&mut def.other_effect_ids, old_id, new_id);
            changed.then(|| StoredDefinition {
                definition: def,
                ..stored.clone()
            })
        })
        .collect()
}

/// Replace a live definition. When the name changes the id is re-derived and
/// every live referrer is rewritten in the same batch as the definition itself,
/// so either all of them land or none do.
pub fn update_definition(
    docs: &dyn DocumentStore,
    doc_id: &str,
    definition: EffectDefinition,
) -> Result<Option<RenameReport>, EffectsError> {
    let Some(current) = docs.definition(doc_id)? else {
        tracing::warn!(doc_id, "definition not found; nothing to update");
        return Ok(None);
    };
    let in_backup = docs
        .container(&current.container_id)?
        .map(|c| c.is_backup)
        .unwrap_or(false);
    if in_backup {
        return Err(EffectsError::ValidationError(format!(
            "'{}' belongs to the backup partition and cannot be edited",
            current.definition.name
        )));
    }

    let old_id = current.definition.id.clone();
    let new_name = definition.name.clone();
    let updated = StoredDefinition {
        definition: definition.renamed(&new_name),
        ..current
    };
    let new_id = updated.definition.id.clone();

    if old_id == new_id {
        docs.update_definitions(&[updated])?;
        return Ok(Some(RenameReport {
            doc_id: doc_id.to_string(),
            old_id,
            new_id,
            rewritten: Vec::new(),
        }));
    }

    catalog::ensure_unique_id(docs, &new_id, Some(doc_id))?;

    // Plan against the post-rename catalog so a self-reference is rewritten too.
    let live: Vec<StoredDefinition> = catalog::find_all(docs, Partition::Live)?
        .into_iter()
        .map(|d| if d.doc_id == doc_id { updated.clone() } else { d })
        .collect();
    let mut rewrites = rewrite_references(&live, &old_id, &new_id);

    let rewritten: Vec<String> = rewrites
        .iter()
        .map(|d| d.doc_id.clone())
        .filter(|id| id != doc_id)
        .collect();
    if !rewrites.iter().any(|d| d.doc_id == doc_id) {
        rewrites.push(updated);
    }
    docs.update_definitions(&rewrites)?;

    tracing::info!(
        doc_id,
        old_id = %old_id,
        new_id = %new_id,
        referrers = rewritten.len(),
        "definition renamed"
    );
    Ok(Some(RenameReport {
        doc_id: doc_id.to_string(),
        old_id,
        new_id,
        rewritten,
    }))
}

/// Rename a live definition, re-deriving its id and propagating it.
pub fn rename_definition(
    docs: &dyn DocumentStore,
    doc_id: &str,
    new_name: &str,
) -> Result<Option<RenameReport>, EffectsError> {
    let Some(current) = docs.definition(doc_id)? else {
        tracing::warn!(doc_id, "definition not found; nothing to rename");
        return Ok(None);
    };
    let renamed = current.definition.renamed(new_name);
    update_definition(docs, doc_id, renamed)
}
