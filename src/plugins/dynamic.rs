//! Dynamic effect resolution: a ruleset hook, keyed by effect name, that
//! rewrites a dynamic definition from the target's live state right before
//! it is applied.

use crate::core::error::EffectsError;
use crate::core::model::{ActorRecord, ChangeMode, EffectChange, EffectDefinition};
use rustc_hash::FxHashMap;

pub trait DynamicResolver: Send + Sync {
    fn resolve(
        &self,
        definition: &mut EffectDefinition,
        actor: &ActorRecord,
    ) -> Result<(), EffectsError>;
}

impl<F> DynamicResolver for F
where
    F: Fn(&mut EffectDefinition, &ActorRecord) -> Result<(), EffectsError> + Send + Sync,
{
    fn resolve(
        &self,
        definition: &mut EffectDefinition,
        actor: &ActorRecord,
    ) -> Result<(), EffectsError> {
        self(definition, actor)
    }
}

#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: FxHashMap<String, Box<dyn DynamicResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the encumbrance resolvers of the bundled ruleset.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("Encumbered", EncumbranceResolver { penalty: 10 });
        registry.register("Heavily Encumbered", EncumbranceResolver { penalty: 20 });
        registry
    }

    /// Later registrations under the same name replace earlier ones.
    pub fn register(&mut self, effect_name: &str, resolver: impl DynamicResolver + 'static) {
        self.resolvers
            .insert(effect_name.to_string(), Box::new(resolver));
    }

    pub fn is_registered(&self, effect_name: &str) -> bool {
        self.resolvers.contains_key(effect_name)
    }

    /// Rewrite `definition` if it is dynamic and a resolver exists for its name.
    /// Returns whether a resolver ran.
    pub fn apply(
        &self,
        definition: &mut EffectDefinition,
        actor: &ActorRecord,
    ) -> Result<bool, EffectsError> {
        if !definition.is_dynamic {
            return Ok(false);
        }
        let Some(resolver) = self.resolvers.get(&definition.name) else {
            tracing::debug!(effect = %definition.name, "dynamic effect has no resolver");
            return Ok(false);
        };
        resolver.resolve(definition, actor)?;
        tracing::debug!(effect = %definition.name, actor = %actor.uuid, "dynamic effect resolved");
        Ok(true)
    }
}

pub const WALK_SPEED_PATH: &str = "attributes.movement.walk";
pub const WALK_SPEED_KEY: &str = "system.attributes.movement.walk";

/// Lowers walking speed by a flat penalty, never below zero.
pub struct EncumbranceResolver {
    pub penalty: i64,
}

impl DynamicResolver for EncumbranceResolver {
    fn resolve(
        &self,
        definition: &mut EffectDefinition,
        actor: &ActorRecord,
    ) -> Result<(), EffectsError> {
        let walk = actor
            .data_at(WALK_SPEED_PATH)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0);
        let reduced = (walk - self.penalty).max(0);
        let change = EffectChange::new(WALK_SPEED_KEY, ChangeMode::Override, reduced);
        match definition.changes.iter_mut().find(|c| c.key == WALK_SPEED_KEY) {
            Some(existing) => *existing = change,
            None => definition.changes.push(change),
        }
        Ok(())
    }
}
