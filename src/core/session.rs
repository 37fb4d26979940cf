//! Per-session context.
//!
//! An [`EffectSession`] is constructed once when a session connects and torn
//! down with [`EffectSession::close`] (or by dropping it) when it disconnects.
//! Every component receives it explicitly; nothing reads global state.

use crate::core::config::EffectsConfig;
use crate::core::db;
use crate::core::documents::{DocumentStore, SqliteDocuments};
use crate::core::error::EffectsError;
use crate::core::hub::{Authority, Channel, HubEndpoint};
use crate::core::migration::{self, CatalogGenerator, InitReport, Migration, MigrationContext};
use crate::core::settings::{SettingsStore, SqliteSettings};
use crate::core::store::Store;
use crate::plugins::dynamic::ResolverRegistry;
use crate::plugins::relay::{PumpReport, Relay};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Everything a session is built from. Use [`EffectSession::open`] for the
/// SQLite + hub bindings, or fill this in to inject other collaborators.
pub struct SessionParts {
    pub id: String,
    pub name: String,
    pub config: EffectsConfig,
    pub docs: Box<dyn DocumentStore>,
    pub settings: Box<dyn SettingsStore>,
    pub authority: Arc<dyn Authority>,
    pub channel: Arc<dyn Channel>,
    pub resolvers: ResolverRegistry,
}

pub struct EffectSession {
    id: String,
    name: String,
    config: EffectsConfig,
    docs: Box<dyn DocumentStore>,
    settings: Box<dyn SettingsStore>,
    authority: Arc<dyn Authority>,
    channel: Arc<dyn Channel>,
    resolvers: ResolverRegistry,
    relay: Relay,
    selection: Mutex<Vec<String>>,
    /// Set once `initialize` has run while holding authority.
    initialized: AtomicBool,
}

impl EffectSession {
    pub fn from_parts(parts: SessionParts) -> Self {
        let relay = Relay::new(parts.config.relay.dedupe_capacity);
        Self {
            id: parts.id,
            name: parts.name,
            config: parts.config,
            docs: parts.docs,
            settings: parts.settings,
            authority: parts.authority,
            channel: parts.channel,
            resolvers: parts.resolvers,
            relay,
            selection: Mutex::new(Vec::new()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Open a session on a world store, connected through a hub endpoint.
    pub fn open(
        store: &Store,
        config: EffectsConfig,
        endpoint: Arc<HubEndpoint>,
        resolvers: ResolverRegistry,
    ) -> Result<Self, EffectsError> {
        db::initialize_world_db(store)?;
        let actor = endpoint.name().to_string();
        let audit = config.logging.audit;
        Ok(Self::from_parts(SessionParts {
            id: endpoint.session_id().to_string(),
            name: actor.clone(),
            config,
            docs: Box::new(SqliteDocuments::new(store, &actor, audit)),
            settings: Box::new(SqliteSettings::new(store, &actor, audit)),
            authority: endpoint.clone(),
            channel: endpoint,
            resolvers,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EffectsConfig {
        &self.config
    }

    pub fn docs(&self) -> &dyn DocumentStore {
        self.docs.as_ref()
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn authority(&self) -> &dyn Authority {
        self.authority.as_ref()
    }

    pub fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }

    pub fn resolvers(&self) -> &ResolverRegistry {
        &self.resolvers
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Records the host reports as selected/controlled; the implicit toggle target.
    pub fn select(&self, target_uuids: &[String]) {
        if let Ok(mut selection) = self.selection.lock() {
            *selection = target_uuids.to_vec();
        }
    }

    pub fn selection(&self) -> Vec<String> {
        self.selection
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn migration_context<'a>(&'a self, generator: &'a dyn CatalogGenerator) -> MigrationContext<'a> {
        MigrationContext {
            docs: self.docs(),
            settings: self.settings(),
            generator,
        }
    }

    /// Seed, back up and migrate the catalog. Call after connecting as
    /// authority and again after a promotion; until then the session refuses
    /// to execute requests. No-op without authority.
    pub fn initialize(
        &self,
        generator: &dyn CatalogGenerator,
        migrations: &[Migration],
    ) -> Result<InitReport, EffectsError> {
        let ctx = self.migration_context(generator);
        let report = migration::initialize(self.authority(), &ctx, migrations)?;
        if !report.skipped {
            self.initialized.store(true, Ordering::SeqCst);
        }
        Ok(report)
    }

    /// True when this session may execute requests: it holds authority and
    /// has initialized the catalog since gaining it. Observing a lost
    /// authority clears the flag, so a later promotion must initialize again.
    pub fn ready_to_execute(&self) -> bool {
        if !self.authority().is_authority() {
            self.initialized.store(false, Ordering::SeqCst);
            return false;
        }
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn reset_catalog(
        &self,
        generator: &dyn CatalogGenerator,
    ) -> Result<InitReport, EffectsError> {
        let ctx = self.migration_context(generator);
        migration::reset_catalog(self.authority(), &ctx)
    }

    /// Handle every delivered relay envelope, oldest first.
    pub fn pump(&self) -> Result<PumpReport, EffectsError> {
        self.relay.pump(self)
    }

    /// Disconnect from the host.
    pub fn close(self) {
        tracing::info!(session = %self.id, "session closing");
        drop(self);
    }
}
