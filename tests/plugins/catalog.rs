use effectsync::core::config::EffectsConfig;
use effectsync::core::error::EffectsError;
use effectsync::core::hub::LocalHub;
use effectsync::core::model::EffectDefinition;
use effectsync::core::session::EffectSession;
use effectsync::core::store::{Partition, Store};
use effectsync::plugins::catalog::{self, derive_id};
use effectsync::plugins::dynamic::ResolverRegistry;
use effectsync::plugins::srd::{self, SrdCatalog};
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

fn conditions_container(gm: &EffectSession) -> String {
    gm.docs()
        .containers(Partition::Live)
        .unwrap()
        .into_iter()
        .find(|c| c.name == srd::CONDITIONS)
        .unwrap()
        .id
}

#[test]
fn test_derive_id_is_stable_and_distinct_for_distinct_slugs() {
    assert_eq!(derive_id("A"), "ce-a");
    assert_eq!(derive_id("Exhaustion 1"), "ce-exhaustion-1");
    assert_eq!(derive_id("Mage Armor"), derive_id("Mage Armor"));
    assert_ne!(derive_id("Exhaustion 1"), derive_id("Exhaustion 2"));
}

#[test]
fn test_find_by_id_respects_the_partition() {
    let (_tmp, gm) = seeded_world();

    let live = catalog::find_by_id(gm.docs(), "ce-prone", Partition::Live)
        .unwrap()
        .unwrap();
    let backup = catalog::find_by_id(gm.docs(), "ce-prone", Partition::Backup)
        .unwrap()
        .unwrap();
    assert_ne!(live.doc_id, backup.doc_id);
    assert_eq!(live.definition, backup.definition);
    assert!(
        catalog::find_by_id(gm.docs(), "ce-levitating", Partition::Live)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_find_effect_accepts_id_or_name() {
    let (_tmp, gm) = seeded_world();
    let by_name = catalog::find_effect(gm.docs(), "Heavily Encumbered", Partition::Live)
        .unwrap()
        .unwrap();
    let by_id = catalog::find_effect(gm.docs(), "ce-heavily-encumbered", Partition::Live)
        .unwrap()
        .unwrap();
    assert_eq!(by_name.doc_id, by_id.doc_id);
    assert!(by_name.definition.is_dynamic);
}

#[test]
fn test_find_all_is_sorted_case_insensitively() {
    let (_tmp, gm) = seeded_world();
    let names: Vec<String> = catalog::find_all(gm.docs(), Partition::Live)
        .unwrap()
        .into_iter()
        .map(|d| d.definition.name.to_lowercase())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(names.contains(&"mage armor".to_string()));
}

#[test]
fn test_colliding_name_is_rejected() {
    let (_tmp, gm) = seeded_world();
    let container = conditions_container(&gm);

    let err = catalog::create_definition(gm.docs(), &container, EffectDefinition::new("PRONE"))
        .unwrap_err();
    match err {
        EffectsError::NameConflict { id, existing } => {
            assert_eq!(id, "ce-prone");
            assert_eq!(existing, "Prone");
        }
        other => panic!("expected NameConflict, got {other:?}"),
    }
}

#[test]
fn test_created_definition_gets_its_id_from_its_name() {
    let (_tmp, gm) = seeded_world();
    let container = conditions_container(&gm);

    let mut def = EffectDefinition::new("Dazed");
    def.id = "ce-whatever".to_string();
    let stored = catalog::create_definition(gm.docs(), &container, def).unwrap();
    assert_eq!(stored.definition.id, "ce-dazed");
    assert!(
        catalog::find_by_id(gm.docs(), "ce-dazed", Partition::Live)
            .unwrap()
            .is_some()
    );
}

#[test]
fn test_duplicate_picks_a_free_copy_name() {
    let (_tmp, gm) = seeded_world();
    let prone = catalog::find_effect(gm.docs(), "Prone", Partition::Live)
        .unwrap()
        .unwrap();

    let first = catalog::duplicate_definition(gm.docs(), &prone.doc_id)
        .unwrap()
        .unwrap();
    let second = catalog::duplicate_definition(gm.docs(), &prone.doc_id)
        .unwrap()
        .unwrap();
    assert_eq!(first.definition.name, "Prone (Copy)");
    assert_eq!(second.definition.name, "Prone (Copy 2)");
    assert_eq!(first.container_id, prone.container_id);
}
