use effectsync::core::config::EffectsConfig;
use effectsync::core::hub::LocalHub;
use effectsync::core::session::EffectSession;
use effectsync::core::store::Store;
use effectsync::plugins::dynamic::{ResolverRegistry, WALK_SPEED_KEY};
use effectsync::plugins::relay::{EmitOutcome, RemoveEffectData};
use effectsync::plugins::srd::{self, SrdCatalog};
use effectsync::plugins::toggle::{self, AddSource, ToggleAction, ToggleOutcome};
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

fn new_actor(gm: &EffectSession, name: &str) -> String {
    gm.docs()
        .create_actor(name, json!({"attributes": {"movement": {"walk": 30}}}))
        .unwrap()
        .uuid
}

fn names(gm: &EffectSession, target: &str) -> Vec<String> {
    toggle::applied_effects(gm, target)
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect()
}

#[test]
fn test_toggle_round_trip_restores_the_record() {
    let (_tmp, gm) = seeded_world();
    let uuid = new_actor(&gm, "Tess");
    let targets = vec![uuid.clone()];

    // 1. Unapplied -> Applied
    let outcome = toggle::toggle(&gm, "ce-blinded", &targets, false).unwrap();
    let ToggleOutcome::Toggled(steps) = outcome else {
        panic!("expected steps");
    };
    assert_eq!(steps[0].action, ToggleAction::Added);
    assert!(steps[0].forwarded.is_none());
    assert!(toggle::has_applied(&gm, "ce-blinded", &uuid).unwrap());

    // 2. Applied -> Unapplied
    toggle::toggle(&gm, "ce-blinded", &targets, false).unwrap();
    assert!(!toggle::has_applied(&gm, "ce-blinded", &uuid).unwrap());
    assert!(names(&gm, &uuid).is_empty());
}

#[test]
fn test_paralyzed_brings_incapacitated_and_takes_it_away() {
    let (_tmp, gm) = seeded_world();
    let uuid = new_actor(&gm, "Tess");
    let targets = vec![uuid.clone()];

    toggle::toggle(&gm, "Paralyzed", &targets, false).unwrap();
    assert_eq!(names(&gm, &uuid), vec!["Paralyzed", "Incapacitated"]);
    let applied = toggle::applied_effects(&gm, &uuid).unwrap();
    assert_eq!(applied[1].origin.as_deref(), Some(applied[0].id.as_str()));

    toggle::toggle(&gm, "Paralyzed", &targets, false).unwrap();
    assert!(names(&gm, &uuid).is_empty());
}

#[test]
fn test_cascade_is_scoped_to_one_record() {
    let (_tmp, gm) = seeded_world();
    let a = new_actor(&gm, "A");
    let b = new_actor(&gm, "B");

    // Only A's Paralyzed instance becomes the origin of B's effect.
    toggle::toggle(&gm, "Paralyzed", std::slice::from_ref(&a), false).unwrap();
    let parent = toggle::applied_effects(&gm, &a).unwrap()[0].id.clone();
    toggle::add(&gm, AddSource::Named("Prone"), &b, Some(parent.as_str()), false).unwrap();

    toggle::toggle(&gm, "Paralyzed", std::slice::from_ref(&a), false).unwrap();
    assert!(names(&gm, &a).is_empty());
    assert_eq!(names(&gm, &b), vec!["Prone"]);
}

#[test]
fn test_cascade_is_one_level_deep() {
    let (_tmp, gm) = seeded_world();
    let uuid = new_actor(&gm, "Tess");

    toggle::add(&gm, AddSource::Named("Bless"), &uuid, None, false).unwrap();
    let bless = toggle::applied_effects(&gm, &uuid).unwrap()[0].id.clone();
    toggle::add(&gm, AddSource::Named("Prone"), &uuid, Some(bless.as_str()), false).unwrap();
    let prone = toggle::applied_effects(&gm, &uuid).unwrap()[1].id.clone();
    toggle::add(&gm, AddSource::Named("Deafened"), &uuid, Some(prone.as_str()), false).unwrap();

    let removed = toggle::execute_remove(
        &gm,
        RemoveEffectData {
            effect_id: "Bless".to_string(),
            target_uuid: uuid.clone(),
            origin: None,
        },
    )
    .unwrap();
    assert_eq!(removed, vec![bless, prone]);
    assert_eq!(names(&gm, &uuid), vec!["Deafened"]);
}

#[test]
fn test_sub_effects_are_added_even_when_already_present() {
    let (_tmp, gm) = seeded_world();
    let uuid = new_actor(&gm, "Tess");

    toggle::add(&gm, AddSource::Named("Incapacitated"), &uuid, None, false).unwrap();
    toggle::add(&gm, AddSource::Named("Stunned"), &uuid, None, false).unwrap();
    assert_eq!(
        names(&gm, &uuid),
        vec!["Incapacitated", "Stunned", "Incapacitated"]
    );

    // Removing Stunned leaves the independently applied one.
    toggle::remove(&gm, "Stunned", &uuid, None).unwrap();
    let left = toggle::applied_effects(&gm, &uuid).unwrap();
    assert_eq!(left.len(), 1);
    assert!(left[0].origin.is_none());
}

#[test]
fn test_toggle_over_several_targets_decides_per_target() {
    let (_tmp, gm) = seeded_world();
    let a = new_actor(&gm, "A");
    let b = new_actor(&gm, "B");
    toggle::add(&gm, AddSource::Named("Prone"), &a, None, false).unwrap();

    let outcome = toggle::toggle(&gm, "Prone", &[a.clone(), b.clone()], false).unwrap();
    let ToggleOutcome::Toggled(steps) = outcome else {
        panic!("expected steps");
    };
    assert_eq!(steps[0].action, ToggleAction::Removed);
    assert_eq!(steps[1].action, ToggleAction::Added);
    assert!(names(&gm, &a).is_empty());
    assert_eq!(names(&gm, &b), vec!["Prone"]);
}

#[test]
fn test_missing_target_is_a_noop() {
    let (_tmp, gm) = seeded_world();
    let outcome = toggle::add(&gm, AddSource::Named("Prone"), "Actor.gone", None, false).unwrap();
    assert!(outcome.is_none());
    assert!(!toggle::has_applied(&gm, "Prone", "Actor.gone").unwrap());
}

#[test]
fn test_payload_source_skips_the_catalog() {
    let (_tmp, gm) = seeded_world();
    let uuid = new_actor(&gm, "Tess");
    let custom = effectsync::core::model::EffectDefinition::new("Hexed").rounds(10);

    let outcome = toggle::add(&gm, AddSource::Payload(custom), &uuid, None, true).unwrap();
    assert_eq!(outcome, Some(EmitOutcome::Executed));
    let applied = toggle::applied_effects(&gm, &uuid).unwrap();
    assert_eq!(applied[0].effect_id, "ce-hexed");
    assert!(applied[0].overlay);
    assert_eq!(applied[0].payload.duration.rounds, Some(10));
}

#[test]
fn test_encumbrance_never_drops_speed_below_zero() {
    let (_tmp, gm) = seeded_world();
    let slow = gm
        .docs()
        .create_actor("Slow", json!({"attributes": {"movement": {"walk": 15}}}))
        .unwrap()
        .uuid;

    toggle::add(&gm, AddSource::Named("Heavily Encumbered"), &slow, None, false).unwrap();
    let applied = toggle::applied_effects(&gm, &slow).unwrap();
    let walk: Vec<&str> = applied[0]
        .payload
        .changes
        .iter()
        .filter(|c| c.key == WALK_SPEED_KEY)
        .map(|c| c.value.as_str())
        .collect();
    assert_eq!(walk, vec!["0"]);
}

#[test]
fn test_toggle_twice_skips_a_disabled_instance() {
    let (_tmp, gm) = seeded_world();
    let uuid = new_actor(&gm, "Tess");
    let targets = vec![uuid.clone()];

    toggle::add(&gm, AddSource::Named("Prone"), &uuid, None, false).unwrap();
    let disabled = toggle::applied_effects(&gm, &uuid).unwrap()[0].id.clone();
    toggle::set_disabled(&gm, &uuid, &disabled, true).unwrap();
    assert!(!toggle::has_applied(&gm, "Prone", &uuid).unwrap());

    // 1. Adds an enabled instance next to the disabled one
    toggle::toggle(&gm, "Prone", &targets, false).unwrap();
    assert!(toggle::has_applied(&gm, "Prone", &uuid).unwrap());

    // 2. Removes the enabled instance, not the disabled one
    toggle::toggle(&gm, "Prone", &targets, false).unwrap();
    assert!(!toggle::has_applied(&gm, "Prone", &uuid).unwrap());
    let left = toggle::applied_effects(&gm, &uuid).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, disabled);
    assert!(left[0].disabled);
}
