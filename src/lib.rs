//! effectsync: status effects on shared tabletop character records.
//!
//! Several sessions connect to one shared world. Exactly one of them, the
//! authority, may mutate character records; every other session relays its
//! requests to it over a publish/subscribe channel.
//!
//! # Architecture
//!
//! ## The Thin Waist
//!
//! All document writes route through `DbBroker`, which serializes them behind
//! an in-process lock and appends an audit line to `broker.events.jsonl`.
//!
//! ## Subsystems
//!
//! - `catalog`: deterministic effect ids and catalog lookups
//! - `references`: id rewrites across the catalog when a definition is renamed
//! - `toggle`: add/remove/toggle with one-hop sub-effects and origin cascade
//! - `relay`: authority routing, envelope decoding, redelivery drops
//! - `dynamic`: ruleset hooks that rewrite dynamic effects per target
//! - `srd`: the bundled catalog and its migrations
//!
//! # Examples
//!
//! ```bash
//! effectsync init
//! effectsync actor add "Tess" --walk 30
//! effectsync effect toggle Paralyzed Actor.01J...
//! effectsync catalog rename Prone "Knocked Prone"
//! ```

pub mod core;
pub mod plugins;

mod cli;

use crate::cli::{ActorCommand, Cli, Command, MigrateCommand};
use crate::core::broker::DbBroker;
use crate::core::config::{self, EffectsConfig};
use crate::core::error::EffectsError;
use crate::core::hub::LocalHub;
use crate::core::migration;
use crate::core::session::EffectSession;
use crate::core::store::Store;
use crate::plugins::dynamic::ResolverRegistry;
use crate::plugins::{catalog, srd, toggle};

use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const STORE_DIR_NAME: &str = ".effectsync";
pub const LOG_ENV: &str = "EFFECTSYNC_LOG";

/// Install the stderr subscriber. `EFFECTSYNC_LOG` wins over the config filter.
pub fn init_logging(config: &EffectsConfig) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn resolve_store(root: Option<PathBuf>) -> Result<Store, EffectsError> {
    let root = match root {
        Some(r) => r,
        None => std::env::current_dir()?.join(STORE_DIR_NAME),
    };
    fs::create_dir_all(&root)?;
    Ok(Store::new(root))
}

/// Connect the local CLI session to a fresh in-process hub.
fn open_session(store: &Store, config: &EffectsConfig) -> Result<EffectSession, EffectsError> {
    let hub = LocalHub::new();
    let endpoint = hub.connect(&config.session.name, config.session.authority)?;
    EffectSession::open(
        store,
        config.clone(),
        endpoint,
        ResolverRegistry::with_defaults(),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<(), EffectsError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run() -> Result<(), EffectsError> {
    let cli = Cli::parse();
    let store = resolve_store(cli.root)?;
    let config = config::load_config(&store)?;
    init_logging(&config);

    let session = open_session(&store, &config)?;
    match cli.command {
        Command::Init => {
            let report = session.initialize(&srd::SrdCatalog, &srd::migrations())?;
            if report.skipped {
                println!(
                    "{} not the authority; initialization skipped",
                    "▸".bright_yellow()
                );
            } else {
                println!(
                    "{} world ready at {}",
                    "✓".bright_green(),
                    store.root().display()
                );
                for failed in &report.failed {
                    println!(
                        "  {} {}: {}",
                        "✗".bright_red(),
                        failed.key,
                        failed.reason
                    );
                }
            }
            print_json(&report)?;
        }
        Command::Catalog(cli) => catalog::run_catalog_cli(&session, cli)?,
        Command::Effect(cli) => {
            // An authority executes nothing before its catalog is current.
            session.initialize(&srd::SrdCatalog, &srd::migrations())?;
            toggle::run_effect_cli(&session, cli)?
        }
        Command::Actor(cli) => match cli.command {
            ActorCommand::Add { name, walk, data } => {
                let data = match data {
                    Some(raw) => serde_json::from_str(&raw)?,
                    None => walk_data(walk),
                };
                let actor = session.docs().create_actor(&name, data)?;
                println!("{} actor created: {}", "✓".bright_green(), actor.uuid);
            }
            ActorCommand::Show { uuid } => match session.docs().actor(&uuid)? {
                Some(actor) => print_json(&json!({
                    "actor": actor,
                    "effects": toggle::applied_effects(&session, &uuid)?,
                }))?,
                None => println!("{} no actor {}", "▸".bright_yellow(), uuid),
            },
        },
        Command::Migrate(cli) => match cli.command {
            MigrateCommand::Status => {
                let applied = migration::applied_migrations(session.settings())?;
                let mut known = srd::migrations();
                known.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.key.cmp(&b.key)));
                for m in &known {
                    match applied.iter().find(|r| r.key == m.key) {
                        Some(record) => println!(
                            "{} {} {} (applied {})",
                            "✓".bright_green(),
                            m.date,
                            m.key,
                            record.applied_at
                        ),
                        None => println!("{} {} {} (pending)", "·".dimmed(), m.date, m.key),
                    }
                }
            }
        },
        Command::Audit { tail } => {
            let events = DbBroker::new(&store, false).read_events()?;
            let skip = tail.map_or(0, |n| events.len().saturating_sub(n));
            for event in events.iter().skip(skip) {
                println!("{}", serde_json::to_string(event)?);
            }
        }
    }
    session.close();
    Ok(())
}

fn walk_data(walk: i64) -> serde_json::Value {
    json!({"attributes": {"movement": {"walk": walk}}})
}
