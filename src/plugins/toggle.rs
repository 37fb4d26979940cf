//! Effect toggle engine.
//!
//! Per (target, effect) the state is Unapplied or Applied. `toggle` picks the
//! transition, `add` and `remove` request it through the relay, and the
//! `execute_*` functions are what the authority runs.
//!
//! Adding an effect also adds its sub-effects, one hop deep, each with its
//! origin pointing at the new instance. Removing an instance removes every
//! instance on the same target whose origin is that instance, one level deep.

use crate::core::error::EffectsError;
use crate::core::model::{AppliedEffectInstance, EffectDefinition, NewInstance};
use crate::core::session::EffectSession;
use crate::core::store::Partition;
use crate::core::time;
use crate::plugins::catalog;
use crate::plugins::relay::{
    AddEffectData, EmitOutcome, RelayRequest, RemoveEffectData, ToggleEffectData,
    UpdateEffectData,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;

/// What to add: a catalog entry by id or name, or a payload built by the caller.
#[derive(Debug, Clone)]
pub enum AddSource<'a> {
    Named(&'a str),
    Payload(EffectDefinition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleAction {
    Added,
    Removed,
    /// Effect or target not found.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStep {
    pub target_uuid: String,
    pub action: ToggleAction,
    /// Request id when the request was forwarded rather than run here.
    pub forwarded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToggleOutcome {
    Toggled(Vec<ToggleStep>),
    NoTargets,
}

fn forwarded_id(outcome: EmitOutcome) -> Option<String> {
    match outcome {
        EmitOutcome::Executed => None,
        EmitOutcome::Forwarded { request_id } => Some(request_id),
    }
}

/// This system's instances on a target, oldest first.
pub fn applied_effects(
    session: &EffectSession,
    target_uuid: &str,
) -> Result<Vec<AppliedEffectInstance>, EffectsError> {
    Ok(session
        .docs()
        .applied_effects(target_uuid)?
        .into_iter()
        .filter(|i| i.is_convenient)
        .collect())
}

/// Whether the target carries an enabled instance of this effect.
pub fn has_applied(
    session: &EffectSession,
    id_or_name: &str,
    target_uuid: &str,
) -> Result<bool, EffectsError> {
    Ok(applied_effects(session, target_uuid)?
        .iter()
        .any(|i| !i.disabled && i.matches(id_or_name)))
}

/// Flip the effect on each target. With no targets given the session's
/// selection is used; with neither, nothing happens.
pub fn toggle(
    session: &EffectSession,
    id_or_name: &str,
    target_uuids: &[String],
    overlay: bool,
) -> Result<ToggleOutcome, EffectsError> {
    let targets = if target_uuids.is_empty() {
        session.selection()
    } else {
        target_uuids.to_vec()
    };
    if targets.is_empty() {
        tracing::warn!(effect = id_or_name, "no targets given and nothing selected");
        return Ok(ToggleOutcome::NoTargets);
    }

    let mut steps = Vec::with_capacity(targets.len());
    for target_uuid in targets {
        let step = if has_applied(session, id_or_name, &target_uuid)? {
            let outcome = remove(session, id_or_name, &target_uuid, None)?;
            ToggleStep {
                target_uuid,
                action: ToggleAction::Removed,
                forwarded: forwarded_id(outcome),
            }
        } else {
            match add(session, AddSource::Named(id_or_name), &target_uuid, None, overlay)? {
                Some(outcome) => ToggleStep {
                    target_uuid,
                    action: ToggleAction::Added,
                    forwarded: forwarded_id(outcome),
                },
                None => ToggleStep {
                    target_uuid,
                    action: ToggleAction::Skipped,
                    forwarded: None,
                },
            }
        };
        steps.push(step);
    }
    Ok(ToggleOutcome::Toggled(steps))
}

/// Resolve, rewrite if dynamic, and request materialization. `None` when the
/// effect or the target does not exist.
pub fn add(
    session: &EffectSession,
    source: AddSource<'_>,
    target_uuid: &str,
    origin: Option<&str>,
    overlay: bool,
) -> Result<Option<EmitOutcome>, EffectsError> {
    let mut definition = match source {
        AddSource::Payload(definition) => definition,
        AddSource::Named(id_or_name) => {
            match catalog::find_effect(session.docs(), id_or_name, Partition::Live)? {
                Some(stored) => stored.definition,
                None => {
                    tracing::warn!(effect = id_or_name, "effect not found; nothing added");
                    return Ok(None);
                }
            }
        }
    };
    let Some(actor) = session.docs().actor(target_uuid)? else {
        tracing::warn!(actor = target_uuid, "target not found; nothing added");
        return Ok(None);
    };
    session.resolvers().apply(&mut definition, &actor)?;

    let outcome = session.relay().emit(
        session,
        RelayRequest::AddEffect(AddEffectData {
            effect_data: definition,
            target_uuid: target_uuid.to_string(),
            origin: origin.map(str::to_string),
            overlay,
        }),
    )?;
    Ok(Some(outcome))
}

/// Request removal. With `origin`, only the instance carrying that origin goes;
/// without, the first enabled instance matching the id or name does.
pub fn remove(
    session: &EffectSession,
    id_or_name: &str,
    target_uuid: &str,
    origin: Option<&str>,
) -> Result<EmitOutcome, EffectsError> {
    session.relay().emit(
        session,
        RelayRequest::RemoveEffect(RemoveEffectData {
            effect_id: id_or_name.to_string(),
            target_uuid: target_uuid.to_string(),
            origin: origin.map(str::to_string),
        }),
    )
}

/// Soft on/off switch for one instance; disabled instances stay on the record.
pub fn set_disabled(
    session: &EffectSession,
    target_uuid: &str,
    instance_id: &str,
    disabled: bool,
) -> Result<EmitOutcome, EffectsError> {
    session.relay().emit(
        session,
        RelayRequest::UpdateEffect(UpdateEffectData {
            target_uuid: target_uuid.to_string(),
            instance_id: instance_id.to_string(),
            disabled,
        }),
    )
}

/// Authority side of `addEffect`: the instance plus its resolvable sub-effects,
/// in one batch.
pub fn execute_add(
    session: &EffectSession,
    data: AddEffectData,
) -> Result<Vec<AppliedEffectInstance>, EffectsError> {
    let Some(actor) = session.docs().actor(&data.target_uuid)? else {
        tracing::warn!(actor = %data.target_uuid, "target not found; add dropped");
        return Ok(Vec::new());
    };

    let instance_id = time::new_id();
    let mut payloads = vec![NewInstance {
        id: instance_id.clone(),
        origin: data.origin,
        overlay: data.overlay,
        is_convenient: true,
        payload: data.effect_data.clone(),
    }];

    for sub_id in &data.effect_data.sub_effect_ids {
        let Some(stored) = catalog::find_by_id(session.docs(), sub_id, Partition::Live)? else {
            tracing::debug!(sub = %sub_id, parent = %data.effect_data.id, "sub-effect not in catalog; skipped");
            continue;
        };
        let mut sub = stored.definition;
        session.resolvers().apply(&mut sub, &actor)?;
        payloads.push(NewInstance {
            id: time::new_id(),
            origin: Some(instance_id.clone()),
            overlay: false,
            is_convenient: true,
            payload: sub,
        });
    }

    let created = session
        .docs()
        .create_applied_effects(&data.target_uuid, &payloads)?;
    tracing::info!(
        effect = %data.effect_data.name,
        actor = %data.target_uuid,
        instances = created.len(),
        "effect applied"
    );
    Ok(created)
}

/// Authority side of `removeEffect`: the chosen instance and every instance on
/// the same target that it originated, in one batch. Returns the removed ids.
pub fn execute_remove(
    session: &EffectSession,
    data: RemoveEffectData,
) -> Result<Vec<String>, EffectsError> {
    let instances = applied_effects(session, &data.target_uuid)?;
    let mut candidates = instances.iter().filter(|i| i.matches(&data.effect_id));
    // Without an origin, the enabled instance `has_applied` saw goes first.
    let chosen = match data.origin.as_deref() {
        Some(origin) => candidates.find(|i| i.origin.as_deref() == Some(origin)),
        None => {
            let matching: Vec<_> = candidates.collect();
            matching
                .iter()
                .find(|i| !i.disabled)
                .or_else(|| matching.first())
                .copied()
        }
    };
    let Some(chosen) = chosen else {
        tracing::warn!(effect = %data.effect_id, actor = %data.target_uuid, "effect not applied; nothing removed");
        return Ok(Vec::new());
    };

    let mut ids = vec![chosen.id.clone()];
    ids.extend(
        instances
            .iter()
            .filter(|i| i.origin.as_deref() == Some(chosen.id.as_str()))
            .map(|i| i.id.clone()),
    );
    session.docs().delete_applied_effects(&data.target_uuid, &ids)?;
    tracing::info!(
        effect = %chosen.name,
        actor = %data.target_uuid,
        cascaded = ids.len() - 1,
        "effect removed"
    );
    Ok(ids)
}

/// Authority side of the legacy `toggleEffect`: decide per target here.
pub fn execute_toggle(session: &EffectSession, data: ToggleEffectData) -> Result<(), EffectsError> {
    let Some(stored) = catalog::find_effect(session.docs(), &data.effect_name, Partition::Live)?
    else {
        tracing::warn!(effect = %data.effect_name, "effect not found; toggle dropped");
        return Ok(());
    };
    for target_uuid in data.target_uuids {
        if has_applied(session, &data.effect_name, &target_uuid)? {
            execute_remove(
                session,
                RemoveEffectData {
                    effect_id: data.effect_name.clone(),
                    target_uuid,
                    origin: None,
                },
            )?;
        } else {
            let Some(actor) = session.docs().actor(&target_uuid)? else {
                tracing::warn!(actor = %target_uuid, "target not found; toggle skipped");
                continue;
            };
            let mut definition = stored.definition.clone();
            session.resolvers().apply(&mut definition, &actor)?;
            execute_add(
                session,
                AddEffectData {
                    effect_data: definition,
                    target_uuid,
                    origin: None,
                    overlay: data.overlay,
                },
            )?;
        }
    }
    Ok(())
}

/// Authority side of `updateEffect`.
pub fn execute_update(session: &EffectSession, data: UpdateEffectData) -> Result<(), EffectsError> {
    let Some(mut instance) = applied_effects(session, &data.target_uuid)?
        .into_iter()
        .find(|i| i.id == data.instance_id)
    else {
        tracing::warn!(instance = %data.instance_id, actor = %data.target_uuid, "instance not found; update dropped");
        return Ok(());
    };
    instance.disabled = data.disabled;
    session.docs().update_applied_effect(&instance)
}

#[derive(Parser, Debug)]
#[clap(name = "effect", about = "Apply, remove and inspect effects on actors")]
pub struct EffectCli {
    #[clap(subcommand)]
    pub command: EffectCommand,
}

#[derive(Subcommand, Debug)]
pub enum EffectCommand {
    /// Add the effect where it is missing, remove it where it is applied.
    Toggle {
        /// Effect id or display name.
        effect: String,
        /// Target actor uuids.
        targets: Vec<String>,
        /// Also show the effect's icon as the token overlay.
        #[clap(long)]
        overlay: bool,
    },
    Add {
        effect: String,
        target: String,
        /// Source uuid recorded on the instance.
        #[clap(long)]
        origin: Option<String>,
        #[clap(long)]
        overlay: bool,
    },
    Remove {
        effect: String,
        target: String,
        /// Only remove the instance carrying this origin.
        #[clap(long)]
        origin: Option<String>,
    },
    /// List the effects applied to a target.
    Status { target: String },
    /// Switch one applied instance off without removing it.
    Disable { target: String, instance_id: String },
    /// Switch a disabled instance back on.
    Enable { target: String, instance_id: String },
}

fn report_emit(what: &str, outcome: EmitOutcome) {
    match outcome {
        EmitOutcome::Executed => println!("{} {}", "✓".bright_green(), what),
        EmitOutcome::Forwarded { request_id } => println!(
            "{} {} forwarded to the authority ({})",
            "▸".bright_cyan(),
            what,
            request_id
        ),
    }
}

pub fn run_effect_cli(session: &EffectSession, cli: EffectCli) -> Result<(), EffectsError> {
    match cli.command {
        EffectCommand::Toggle {
            effect,
            targets,
            overlay,
        } => {
            let outcome = toggle(session, &effect, &targets, overlay)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        EffectCommand::Add {
            effect,
            target,
            origin,
            overlay,
        } => match add(
            session,
            AddSource::Named(&effect),
            &target,
            origin.as_deref(),
            overlay,
        )? {
            Some(outcome) => report_emit(&format!("{} added to {}", effect, target), outcome),
            None => println!("{} nothing added", "▸".bright_yellow()),
        },
        EffectCommand::Remove {
            effect,
            target,
            origin,
        } => {
            let outcome = remove(session, &effect, &target, origin.as_deref())?;
            report_emit(&format!("{} removed from {}", effect, target), outcome);
        }
        EffectCommand::Status { target } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&applied_effects(session, &target)?)?
            );
        }
        EffectCommand::Disable {
            target,
            instance_id,
        } => {
            let outcome = set_disabled(session, &target, &instance_id, true)?;
            report_emit(&format!("{} disabled", instance_id), outcome);
        }
        EffectCommand::Enable {
            target,
            instance_id,
        } => {
            let outcome = set_disabled(session, &target, &instance_id, false)?;
            report_emit(&format!("{} enabled", instance_id), outcome);
        }
    }
    Ok(())
}
