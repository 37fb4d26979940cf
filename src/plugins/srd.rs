//! Bundled catalog content: the core conditions plus a handful of spells.
//!
//! Each definition is built by its own function and names its siblings only
//! through `derive_id`, so no function needs another's output to exist.

use crate::core::error::EffectsError;
use crate::core::migration::{CatalogGenerator, ContainerSeed, Migration, MigrationContext};
use crate::core::model::{ChangeMode, EffectChange, EffectDefinition};
use crate::core::store::Partition;
use crate::plugins::catalog::{self, derive_id};
use crate::plugins::dynamic::WALK_SPEED_KEY;
use chrono::NaiveDate;

pub const CONDITIONS: &str = "Conditions";
pub const SPELLS: &str = "Spells";

/// Names that imply Incapacitated as a sub-effect.
pub const INCAPACITATING: [&str; 4] = ["Paralyzed", "Petrified", "Stunned", "Unconscious"];

#[derive(Debug, Default, Clone, Copy)]
pub struct SrdCatalog;

impl CatalogGenerator for SrdCatalog {
    fn containers(&self) -> Vec<ContainerSeed> {
        vec![
            ContainerSeed {
                name: CONDITIONS.to_string(),
                color: "#6b2d2d".to_string(),
                is_viewable: true,
                definitions: conditions(),
            },
            ContainerSeed {
                name: SPELLS.to_string(),
                color: "#2d4a6b".to_string(),
                is_viewable: true,
                definitions: spells(),
            },
        ]
    }
}

pub fn conditions() -> Vec<EffectDefinition> {
    let mut out = vec![
        blinded(),
        charmed(),
        deafened(),
        encumbered(),
        heavily_encumbered(),
        exhaustion(),
    ];
    out.extend((1..=5).map(exhaustion_level));
    out.extend([
        frightened(),
        grappled(),
        incapacitated(),
        invisible(),
        paralyzed(),
        petrified(),
        poisoned(),
        prone(),
        restrained(),
        stunned(),
        unconscious(),
    ]);
    out
}

pub fn spells() -> Vec<EffectDefinition> {
    vec![bane(), bless(), haste(), lethargic(), mage_armor()]
}

fn condition(name: &str) -> EffectDefinition {
    EffectDefinition::new(name).icon(&format!(
        "icons/conditions/{}.svg",
        name.to_lowercase().replace(' ', "-")
    ))
}

fn blinded() -> EffectDefinition {
    condition("Blinded")
        .description("Automatically fail any ability check that requires sight. Attacks against have advantage; own attacks have disadvantage.")
        .status("blinded")
}

fn charmed() -> EffectDefinition {
    condition("Charmed")
        .description("Cannot attack the charmer or target them with harmful effects.")
        .status("charmed")
}

fn deafened() -> EffectDefinition {
    condition("Deafened")
        .description("Automatically fail any ability check that requires hearing.")
        .status("deafened")
}

fn encumbered() -> EffectDefinition {
    condition("Encumbered")
        .description("Speed drops by 10 feet.")
        .dynamic()
        .change(EffectChange::new(WALK_SPEED_KEY, ChangeMode::Add, -10))
        .other(&["Heavily Encumbered"])
}

fn heavily_encumbered() -> EffectDefinition {
    condition("Heavily Encumbered")
        .description("Speed drops by 20 feet; disadvantage on physical checks, attacks and saves.")
        .dynamic()
        .change(EffectChange::new(WALK_SPEED_KEY, ChangeMode::Add, -20))
        .other(&["Encumbered"])
}

fn exhaustion() -> EffectDefinition {
    condition("Exhaustion")
        .description("Choose a level of exhaustion.")
        .nested(&[
            "Exhaustion 1",
            "Exhaustion 2",
            "Exhaustion 3",
            "Exhaustion 4",
            "Exhaustion 5",
        ])
}

fn exhaustion_level(level: u8) -> EffectDefinition {
    let def = condition(&format!("Exhaustion {}", level))
        .description(&format!("Exhaustion level {}.", level))
        .change(EffectChange::new(
            "system.attributes.exhaustion",
            ChangeMode::Override,
            level,
        ))
        .other(&["Exhaustion"]);
    if level >= 2 {
        def.change(EffectChange::new(
            WALK_SPEED_KEY,
            ChangeMode::Multiply,
            "0.5",
        ))
    } else {
        def
    }
}

fn frightened() -> EffectDefinition {
    condition("Frightened")
        .description("Disadvantage on checks and attacks while the source of fear is in sight.")
        .status("frightened")
}

fn grappled() -> EffectDefinition {
    condition("Grappled")
        .description("Speed becomes 0.")
        .status("grappled")
        .change(EffectChange::new(WALK_SPEED_KEY, ChangeMode::Override, 0))
}

fn incapacitated() -> EffectDefinition {
    condition("Incapacitated")
        .description("Cannot take actions or reactions.")
        .status("incapacitated")
}

fn invisible() -> EffectDefinition {
    condition("Invisible")
        .description("Impossible to see without special senses. Attacks against have disadvantage.")
        .status("invisible")
}

fn paralyzed() -> EffectDefinition {
    condition("Paralyzed")
        .description("Incapacitated; cannot move or speak. Automatically fails Strength and Dexterity saves.")
        .status("paralysis")
        .sub(&["Incapacitated"])
}

fn petrified() -> EffectDefinition {
    condition("Petrified")
        .description("Transformed into solid inanimate substance; incapacitated.")
        .status("petrified")
        .sub(&["Incapacitated"])
}

fn poisoned() -> EffectDefinition {
    condition("Poisoned")
        .description("Disadvantage on attack rolls and ability checks.")
        .status("poisoned")
}

fn prone() -> EffectDefinition {
    condition("Prone")
        .description("Only movement option is to crawl. Disadvantage on attack rolls.")
        .status("prone")
}

fn restrained() -> EffectDefinition {
    condition("Restrained")
        .description("Speed becomes 0. Disadvantage on Dexterity saves.")
        .status("restrained")
        .change(EffectChange::new(WALK_SPEED_KEY, ChangeMode::Override, 0))
}

fn stunned() -> EffectDefinition {
    condition("Stunned")
        .description("Incapacitated; can speak only falteringly.")
        .status("stun")
        .sub(&["Incapacitated"])
}

fn unconscious() -> EffectDefinition {
    condition("Unconscious")
        .description("Incapacitated, drops whatever it is holding, and falls prone.")
        .status("unconscious")
        .sub(&["Incapacitated", "Prone"])
}

fn bane() -> EffectDefinition {
    EffectDefinition::new("Bane")
        .description("Subtract 1d4 from attack rolls and saving throws.")
        .icon("icons/spells/bane.svg")
        .seconds(60)
        .change(EffectChange::new("system.bonuses.All-Attacks", ChangeMode::Add, "-1d4"))
        .change(EffectChange::new("system.bonuses.abilities.save", ChangeMode::Add, "-1d4"))
        .other(&["Bless"])
}

fn bless() -> EffectDefinition {
    EffectDefinition::new("Bless")
        .description("Add 1d4 to attack rolls and saving throws.")
        .icon("icons/spells/bless.svg")
        .seconds(60)
        .change(EffectChange::new("system.bonuses.All-Attacks", ChangeMode::Add, "+1d4"))
        .change(EffectChange::new("system.bonuses.abilities.save", ChangeMode::Add, "+1d4"))
        .other(&["Bane"])
}

fn haste() -> EffectDefinition {
    EffectDefinition::new("Haste")
        .description("Speed doubled, +2 AC, advantage on Dexterity saves.")
        .icon("icons/spells/haste.svg")
        .seconds(60)
        .change(EffectChange::new("system.attributes.ac.bonus", ChangeMode::Add, "+2"))
        .change(EffectChange::new(WALK_SPEED_KEY, ChangeMode::Multiply, "2"))
        .other(&["Lethargic"])
}

fn lethargic() -> EffectDefinition {
    EffectDefinition::new("Lethargic")
        .description("The wave of lethargy after Haste ends: cannot move or take actions.")
        .icon("icons/spells/lethargic.svg")
        .rounds(1)
        .sub(&["Incapacitated"])
        .change(EffectChange::new(WALK_SPEED_KEY, ChangeMode::Override, 0))
}

fn mage_armor() -> EffectDefinition {
    EffectDefinition::new("Mage Armor")
        .description("Base AC becomes 13 + Dexterity modifier.")
        .icon("icons/spells/mage-armor.svg")
        .seconds(28_800)
        .change(EffectChange::new("system.attributes.ac.calc", ChangeMode::Override, "mage"))
}

/// Catalog migrations shipped with the bundled content.
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            "2024-05-18-incapacitated-sub-effects",
            date(2024, 5, 18),
            "incapacitating conditions now carry Incapacitated",
            incapacitated_sub_effects,
        ),
        Migration::new(
            "2024-08-02-backfill-catalog",
            date(2024, 8, 2),
            "bundled definitions missing from live containers added",
            backfill_catalog,
        ),
    ]
}

/// Migration dates are constants; an impossible one is a programming error.
fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("migration date is a valid calendar day")
}

fn incapacitated_sub_effects(ctx: &MigrationContext<'_>) -> Result<(), EffectsError> {
    let incapacitated = derive_id("Incapacitated");
    let mut updates = Vec::new();
    for mut stored in catalog::find_all(ctx.docs, Partition::Live)? {
        if INCAPACITATING.contains(&stored.definition.name.as_str())
            && !stored.definition.sub_effect_ids.contains(&incapacitated)
        {
            stored.definition.sub_effect_ids.push(incapacitated.clone());
            updates.push(stored);
        }
    }
    ctx.docs.update_definitions(&updates)
}

fn backfill_catalog(ctx: &MigrationContext<'_>) -> Result<(), EffectsError> {
    let live = ctx.docs.containers(Partition::Live)?;
    for seed in ctx.generator.containers() {
        let Some(container) = live.iter().find(|c| c.name == seed.name) else {
            tracing::debug!(container = %seed.name, "no live container to backfill");
            continue;
        };
        let mut missing = Vec::new();
        for def in seed.definitions {
            if catalog::find_by_id(ctx.docs, &def.id, Partition::Live)?.is_none()
                && !missing.iter().any(|m: &EffectDefinition| m.id == def.id)
            {
                missing.push(def);
            }
        }
        if !missing.is_empty() {
            tracing::info!(container = %seed.name, added = missing.len(), "catalog backfilled");
            ctx.docs.create_definitions(&container.id, &missing)?;
        }
    }
    Ok(())
}
