use effectsync::core::broker::DbBroker;
use effectsync::core::config::EffectsConfig;
use effectsync::core::error::EffectsError;
use effectsync::core::hub::{Channel, LocalHub};
use effectsync::core::model::{ActorRecord, EffectDefinition};
use effectsync::core::session::EffectSession;
use effectsync::core::store::{Partition, Store};
use effectsync::plugins::catalog;
use effectsync::plugins::dynamic::ResolverRegistry;
use effectsync::plugins::relay::{EmitOutcome, Envelope, ReceiveOutcome};
use effectsync::plugins::srd::{self, SrdCatalog};
use effectsync::plugins::toggle::{self, AddSource, ToggleAction, ToggleOutcome};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::{TempDir, tempdir};

struct Table {
    _tmp: TempDir,
    store: Store,
    hub: Arc<LocalHub>,
}

impl Table {
    fn new() -> Self {
        let tmp = tempdir().unwrap();
        let store = Store::new(tmp.path());
        Self {
            _tmp: tmp,
            store,
            hub: LocalHub::new(),
        }
    }

    fn join(&self, name: &str, authority: bool) -> EffectSession {
        self.join_with(name, authority, ResolverRegistry::with_defaults())
    }

    fn join_with(&self, name: &str, authority: bool, resolvers: ResolverRegistry) -> EffectSession {
        let endpoint = self.hub.connect(name, authority).unwrap();
        EffectSession::open(&self.store, EffectsConfig::default(), endpoint, resolvers).unwrap()
    }
}

fn seeded(table: &Table) -> (EffectSession, String) {
    let gm = table.join("gm", true);
    gm.initialize(&SrdCatalog, &srd::migrations()).unwrap();
    let uuid = gm
        .docs()
        .create_actor("Tess", json!({"attributes": {"movement": {"walk": 30}}}))
        .unwrap()
        .uuid;
    (gm, uuid)
}

#[test]
fn test_player_toggle_runs_once_on_the_authority() {
    let table = Table::new();
    let (gm, uuid) = seeded(&table);
    let player = table.join("player", false);

    // 1. Player emits; nothing changes until the authority pumps
    let outcome = toggle::toggle(&player, "Paralyzed", std::slice::from_ref(&uuid), false).unwrap();
    let ToggleOutcome::Toggled(steps) = outcome else {
        panic!("expected steps");
    };
    assert_eq!(steps[0].action, ToggleAction::Added);
    assert!(steps[0].forwarded.is_some());
    assert!(!toggle::has_applied(&player, "Paralyzed", &uuid).unwrap());

    // 2. Authority executes exactly once
    let report = gm.pump().unwrap();
    assert_eq!(report.executed, 1);
    assert!(report.errors.is_empty());
    assert_eq!(toggle::applied_effects(&gm, &uuid).unwrap().len(), 2);
    assert!(gm.pump().unwrap().executed == 0);

    // 3. Player sees the shared record
    assert!(toggle::has_applied(&player, "Incapacitated", &uuid).unwrap());
}

#[test]
fn test_non_authority_sessions_discard_relayed_requests() {
    let table = Table::new();
    let (gm, uuid) = seeded(&table);
    let alice = table.join("alice", false);
    let bob = table.join("bob", false);

    toggle::toggle(&alice, "Prone", std::slice::from_ref(&uuid), false).unwrap();
    let report = bob.pump().unwrap();
    assert_eq!(report.discarded, 1);
    assert_eq!(report.executed, 0);

    assert_eq!(gm.pump().unwrap().executed, 1);
    assert_eq!(toggle::applied_effects(&gm, &uuid).unwrap().len(), 1);
}

#[test]
fn test_redelivered_envelope_is_dropped() {
    let table = Table::new();
    let (gm, uuid) = seeded(&table);
    let player = table.join("player", false);

    let EmitOutcome::Forwarded { request_id } = toggle::remove(&player, "Prone", &uuid, None).unwrap()
    else {
        panic!("expected forwarding");
    };
    let delivered = gm.channel().drain().unwrap();
    assert_eq!(delivered.len(), 1);
    let envelope: Envelope = serde_json::from_value(delivered[0].clone()).unwrap();
    assert_eq!(envelope.request_id, request_id);
    assert_eq!(envelope.sender, player.id());

    assert_eq!(
        gm.relay().receive(&gm, delivered[0].clone()).unwrap(),
        ReceiveOutcome::Executed
    );
    assert_eq!(
        gm.relay().receive(&gm, delivered[0].clone()).unwrap(),
        ReceiveOutcome::Duplicate
    );
}

#[test]
fn test_duplicate_add_is_not_applied_twice() {
    let table = Table::new();
    let (gm, uuid) = seeded(&table);
    let player = table.join("player", false);

    toggle::toggle(&player, "Prone", std::slice::from_ref(&uuid), false).unwrap();
    let delivered = gm.channel().drain().unwrap();
    // Simulate the channel delivering the same envelope twice.
    let report = {
        gm.relay().receive(&gm, delivered[0].clone()).unwrap();
        gm.relay().receive(&gm, delivered[0].clone()).unwrap()
    };
    assert_eq!(report, ReceiveOutcome::Duplicate);
    assert_eq!(toggle::applied_effects(&gm, &uuid).unwrap().len(), 1);
}

#[test]
fn test_unknown_request_fails_locally() {
    let table = Table::new();
    let (gm, _uuid) = seeded(&table);

    let endpoint = table.hub.connect("rogue-client", false).unwrap();
    endpoint
        .publish(json!({
            "requestId": "01HX0000000000000000000000",
            "sender": "rogue-client",
            "ts": "0Z",
            "message": {"request": "deleteWorld", "data": {}}
        }))
        .unwrap();

    let report = gm.pump().unwrap();
    assert_eq!(report.executed, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("deleteWorld"));
    // Nothing is sent back to the sender.
    assert!(endpoint.drain().unwrap().is_empty());
}

#[test]
fn test_emit_without_authority_fails_before_any_side_effect() {
    let table = Table::new();
    let uuid = {
        let (gm, uuid) = seeded(&table);
        gm.close();
        uuid
    };
    let player = table.join("player", false);
    let watcher = table.join("watcher", false);
    let before = DbBroker::new(&table.store, false).read_events().unwrap().len();

    let err = toggle::toggle(&player, "Prone", std::slice::from_ref(&uuid), false).unwrap_err();
    assert!(matches!(err, EffectsError::AuthorityAbsent(ref tag) if tag == "addEffect"));
    assert!(watcher.channel().drain().unwrap().is_empty());
    assert!(toggle::applied_effects(&player, &uuid).unwrap().is_empty());

    // Only reads happened.
    let events = DbBroker::new(&table.store, false).read_events().unwrap();
    let writes = [".create", ".delete", ".update", ".set"];
    assert!(
        events[before..]
            .iter()
            .all(|e| !writes.iter().any(|w| e.op.ends_with(w)))
    );
}

#[test]
fn test_promoted_session_takes_over_the_relay() {
    let table = Table::new();
    let (gm, uuid) = seeded(&table);
    let player = table.join("player", false);

    table.hub.promote(player.id()).unwrap();
    let outcome = toggle::add(&gm, AddSource::Named("Prone"), &uuid, None, false).unwrap();
    assert!(matches!(outcome, Some(EmitOutcome::Forwarded { .. })));

    // Nothing runs until the new authority has initialized; the request waits.
    let held = player.pump().unwrap();
    assert!(held.held);
    assert_eq!(held.executed, 0);
    assert!(!toggle::has_applied(&gm, "Prone", &uuid).unwrap());
    let err = toggle::remove(&player, "Prone", &uuid, None).unwrap_err();
    assert!(matches!(err, EffectsError::AuthorityNotInitialized(ref tag) if tag == "removeEffect"));

    player.initialize(&SrdCatalog, &srd::migrations()).unwrap();
    let report = player.pump().unwrap();
    assert!(!report.held);
    assert_eq!(report.executed, 1);
    assert!(toggle::has_applied(&gm, "Prone", &uuid).unwrap());
}

#[test]
fn test_promotion_runs_pending_migrations_before_serving() {
    let table = Table::new();
    let gm = table.join("gm", true);
    gm.initialize(&SrdCatalog, &[]).unwrap();
    let uuid = gm.docs().create_actor("Tess", json!({})).unwrap().uuid;
    let player = table.join("player", false);

    table.hub.promote(player.id()).unwrap();
    let report = player.initialize(&SrdCatalog, &srd::migrations()).unwrap();
    assert_eq!(report.applied.len(), 2);
    assert!(player.ready_to_execute());
    assert!(!gm.ready_to_execute());

    toggle::add(&player, AddSource::Named("Paralyzed"), &uuid, None, false).unwrap();
    assert!(toggle::has_applied(&player, "Incapacitated", &uuid).unwrap());

    // Losing authority and getting it back requires a fresh initialize.
    table.hub.promote(gm.id()).unwrap();
    assert!(!player.ready_to_execute());
    table.hub.promote(player.id()).unwrap();
    assert!(!player.ready_to_execute());
}

#[test]
fn test_failed_relayed_request_runs_again_on_redelivery() {
    let table = Table::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut resolvers = ResolverRegistry::new();
    resolvers.register("Wobbly", move |_: &mut EffectDefinition, _: &ActorRecord| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(EffectsError::ValidationError("transient".to_string()));
        }
        Ok(())
    });
    let gm = table.join_with("gm", true, resolvers);
    gm.initialize(&SrdCatalog, &srd::migrations()).unwrap();
    let conditions = gm
        .docs()
        .containers(Partition::Live)
        .unwrap()
        .into_iter()
        .find(|c| c.name == srd::CONDITIONS)
        .unwrap()
        .id;
    catalog::create_definition(gm.docs(), &conditions, EffectDefinition::new("Wobbly").dynamic())
        .unwrap();
    let uuid = gm.docs().create_actor("Tess", json!({})).unwrap().uuid;
    let player = table.join("player", false);

    let shaken = EffectDefinition::new("Shaken").sub(&["Wobbly"]);
    toggle::add(&player, AddSource::Payload(shaken), &uuid, None, false).unwrap();
    let delivered = gm.channel().drain().unwrap();
    assert_eq!(delivered.len(), 1);

    // 1. First delivery fails inside the resolver and writes nothing
    assert!(gm.relay().receive(&gm, delivered[0].clone()).is_err());
    assert!(toggle::applied_effects(&gm, &uuid).unwrap().is_empty());

    // 2. The redelivered copy is not mistaken for a duplicate
    assert_eq!(
        gm.relay().receive(&gm, delivered[0].clone()).unwrap(),
        ReceiveOutcome::Executed
    );
    assert_eq!(
        gm.relay().receive(&gm, delivered[0].clone()).unwrap(),
        ReceiveOutcome::Duplicate
    );
    let names: Vec<String> = toggle::applied_effects(&gm, &uuid)
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["Shaken", "Wobbly"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_relayed_disable_keeps_the_instance() {
    let table = Table::new();
    let (gm, uuid) = seeded(&table);
    let player = table.join("player", false);
    toggle::toggle(&gm, "Prone", std::slice::from_ref(&uuid), false).unwrap();
    let id = toggle::applied_effects(&gm, &uuid).unwrap()[0].id.clone();

    toggle::set_disabled(&player, &uuid, &id, true).unwrap();
    assert_eq!(gm.pump().unwrap().executed, 1);
    let applied = toggle::applied_effects(&player, &uuid).unwrap();
    assert_eq!(applied.len(), 1);
    assert!(applied[0].disabled);
    assert!(!toggle::has_applied(&player, "Prone", &uuid).unwrap());
}
