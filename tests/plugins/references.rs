use effectsync::core::config::EffectsConfig;
use effectsync::core::error::EffectsError;
use effectsync::core::hub::LocalHub;
use effectsync::core::session::EffectSession;
use effectsync::core::store::{Partition, Store};
use effectsync::plugins::catalog::{self, derive_id};
use effectsync::plugins::dynamic::ResolverRegistry;
use effectsync::plugins::references;
use effectsync::plugins::srd::{self, SrdCatalog};
use effectsync::plugins::toggle;
use serde_json::json;
use tempfile::{TempDir, tempdir};

fn seeded_world() -> (TempDir, EffectSession) {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path());
    let endpoint = LocalHub::new().connect("gm", true).unwrap();
    let gm = EffectSession::open(
        &store,
        EffectsConfig::default(),
        endpoint,
        ResolverRegistry::with_defaults(),
    )
    .unwrap();
    gm.initialize(&SrdCatalog, &srd::migrations()).unwrap();
    (tmp, gm)
}

fn live(gm: &EffectSession, name: &str) -> effectsync::core::model::StoredDefinition {
    catalog::find_effect(gm.docs(), name, Partition::Live)
        .unwrap()
        .unwrap()
}

#[test]
fn test_rename_rewrites_every_live_reference_in_place() {
    let (_tmp, gm) = seeded_world();
    let incapacitated = live(&gm, "Incapacitated");

    let report = references::rename_definition(gm.docs(), &incapacitated.doc_id, "Helpless")
        .unwrap()
        .unwrap();
    assert_eq!(report.old_id, "ce-incapacitated");
    assert_eq!(report.new_id, "ce-helpless");
    // Paralyzed, Petrified, Stunned, Unconscious and Lethargic
    assert_eq!(report.rewritten.len(), 5);

    for name in srd::INCAPACITATING {
        let def = live(&gm, name).definition;
        assert!(def.sub_effect_ids.contains(&"ce-helpless".to_string()), "{name}");
        assert!(!def.sub_effect_ids.contains(&"ce-incapacitated".to_string()), "{name}");
    }
    // Position is kept: Incapacitated came before Prone.
    assert_eq!(
        live(&gm, "Unconscious").definition.sub_effect_ids,
        vec!["ce-helpless".to_string(), "ce-prone".to_string()]
    );
    assert!(
        catalog::find_by_id(gm.docs(), "ce-incapacitated", Partition::Live)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_rename_keeps_nested_list_order() {
    let (_tmp, gm) = seeded_world();
    let level_three = live(&gm, "Exhaustion 3");

    references::rename_definition(gm.docs(), &level_three.doc_id, "Exhaustion III").unwrap();
    assert_eq!(
        live(&gm, "Exhaustion").definition.nested_effect_ids,
        vec![
            derive_id("Exhaustion 1"),
            derive_id("Exhaustion 2"),
            "ce-exhaustion-iii".to_string(),
            derive_id("Exhaustion 4"),
            derive_id("Exhaustion 5"),
        ]
    );
}

#[test]
fn test_backup_partition_is_untouched_by_rename() {
    let (_tmp, gm) = seeded_world();
    let incapacitated = live(&gm, "Incapacitated");
    references::rename_definition(gm.docs(), &incapacitated.doc_id, "Helpless").unwrap();

    let backup_paralyzed = catalog::find_effect(gm.docs(), "Paralyzed", Partition::Backup)
        .unwrap()
        .unwrap();
    assert_eq!(
        backup_paralyzed.definition.sub_effect_ids,
        vec!["ce-incapacitated".to_string()]
    );
    assert!(
        catalog::find_by_id(gm.docs(), "ce-incapacitated", Partition::Backup)
            .unwrap()
            .is_some()
    );
}

#[test]
fn test_backup_definitions_cannot_be_edited() {
    let (_tmp, gm) = seeded_world();
    let backup = catalog::find_effect(gm.docs(), "Prone", Partition::Backup)
        .unwrap()
        .unwrap();
    let err = references::rename_definition(gm.docs(), &backup.doc_id, "Flat").unwrap_err();
    assert!(matches!(err, EffectsError::ValidationError(_)));
}

#[test]
fn test_rename_onto_a_taken_id_changes_nothing() {
    let (_tmp, gm) = seeded_world();
    let stunned = live(&gm, "Stunned");

    let err = references::rename_definition(gm.docs(), &stunned.doc_id, "paralyzed").unwrap_err();
    assert!(matches!(err, EffectsError::NameConflict { .. }));
    assert_eq!(live(&gm, "Stunned").definition, stunned.definition);
}

#[test]
fn test_rename_of_missing_definition_is_a_noop() {
    let (_tmp, gm) = seeded_world();
    assert!(
        references::rename_definition(gm.docs(), "no-such-doc", "Anything")
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_same_id_edit_only_touches_the_definition() {
    let (_tmp, gm) = seeded_world();
    let prone = live(&gm, "Prone");
    let edited = prone.definition.clone().description("Lying flat.");

    let report = references::update_definition(gm.docs(), &prone.doc_id, edited)
        .unwrap()
        .unwrap();
    assert!(report.rewritten.is_empty());
    assert_eq!(live(&gm, "Prone").definition.description, "Lying flat.");
}

#[test]
fn test_renamed_sub_effect_is_still_applied() {
    let (_tmp, gm) = seeded_world();
    let incapacitated = live(&gm, "Incapacitated");
    references::rename_definition(gm.docs(), &incapacitated.doc_id, "Helpless").unwrap();

    let actor = gm.docs().create_actor("Tess", json!({})).unwrap();
    toggle::toggle(&gm, "Paralyzed", std::slice::from_ref(&actor.uuid), false).unwrap();
    assert!(toggle::has_applied(&gm, "Helpless", &actor.uuid).unwrap());
}
