//! Document shapes shared by the catalog, the toggle engine and the relay.

use crate::plugins::catalog::derive_id;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How a change combines with the target's existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ChangeMode {
    Custom,
    Multiply,
    #[default]
    Add,
    Downgrade,
    Upgrade,
    Override,
}

/// One keyed mutation instruction applied to a target record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectChange {
    pub key: String,
    #[serde(default)]
    pub mode: ChangeMode,
    pub value: String,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl EffectChange {
    pub fn new(key: &str, mode: ChangeMode, value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            mode,
            value: value.to_string(),
            priority: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
}

impl DurationPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.rounds.is_none() && self.turns.is_none() && self.seconds.is_none()
    }
}

/// An effect template. `id` is derived from `name` and is the identity other
/// definitions use in their reference lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub duration: DurationPolicy,
    #[serde(default)]
    pub changes: Vec<EffectChange>,
    #[serde(default = "default_true")]
    pub is_viewable: bool,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<String>,
    #[serde(default)]
    pub nested_effect_ids: Vec<String>,
    #[serde(default)]
    pub sub_effect_ids: Vec<String>,
    #[serde(default)]
    pub other_effect_ids: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl EffectDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            id: derive_id(name),
            name: name.to_string(),
            description: String::new(),
            icon: String::new(),
            duration: DurationPolicy::default(),
            changes: Vec::new(),
            is_viewable: true,
            is_dynamic: false,
            status_id: None,
            nested_effect_ids: Vec::new(),
            sub_effect_ids: Vec::new(),
            other_effect_ids: Vec::new(),
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    pub fn icon(mut self, path: &str) -> Self {
        self.icon = path.to_string();
        self
    }

    pub fn rounds(mut self, rounds: u32) -> Self {
        self.duration.rounds = Some(rounds);
        self
    }

    pub fn seconds(mut self, seconds: u64) -> Self {
        self.duration.seconds = Some(seconds);
        self
    }

    pub fn change(mut self, change: EffectChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.is_dynamic = true;
        self
    }

    pub fn status(mut self, status_id: &str) -> Self {
        self.status_id = Some(status_id.to_string());
        self
    }

    /// Reference sibling definitions by name. Only their ids are stored.
    pub fn nested(mut self, names: &[&str]) -> Self {
        self.nested_effect_ids
            .extend(names.iter().map(|n| derive_id(n)));
        self
    }

    pub fn sub(mut self, names: &[&str]) -> Self {
        self.sub_effect_ids.extend(names.iter().map(|n| derive_id(n)));
        self
    }

    pub fn other(mut self, names: &[&str]) -> Self {
        self.other_effect_ids
            .extend(names.iter().map(|n| derive_id(n)));
        self
    }

    /// Rename and re-derive the id. Reference propagation is the caller's job.
    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.id = derive_id(name);
        self
    }

    pub fn matches(&self, id_or_name: &str) -> bool {
        self.id == id_or_name || self.name == id_or_name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub name: String,
    pub color: String,
    pub is_viewable: bool,
    pub is_backup: bool,
    pub backup_of: Option<String>,
    pub sort: i64,
}

#[derive(Debug, Clone)]
pub struct NewContainer {
    pub name: String,
    pub color: String,
    pub is_viewable: bool,
    pub is_backup: bool,
    pub backup_of: Option<String>,
    pub sort: i64,
}

/// A definition as persisted: the document id plus its container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDefinition {
    pub doc_id: String,
    pub container_id: String,
    pub sort: i64,
    pub definition: EffectDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub uuid: String,
    pub name: String,
    pub data: JsonValue,
}

impl ActorRecord {
    /// Dotted-path lookup into system data, e.g. `attributes.movement.walk`.
    pub fn data_at(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.data, |node, segment| node.get(segment))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedEffectInstance {
    pub id: String,
    pub target_uuid: String,
    pub effect_id: String,
    pub name: String,
    pub origin: Option<String>,
    pub disabled: bool,
    pub is_convenient: bool,
    pub overlay: bool,
    pub payload: EffectDefinition,
    pub created_at: String,
}

impl AppliedEffectInstance {
    pub fn matches(&self, id_or_name: &str) -> bool {
        self.effect_id == id_or_name || self.name == id_or_name
    }
}

#[derive(Debug, Clone)]
pub struct NewInstance {
    /// Pre-assigned so sub-effects can point their origin at it in the same batch.
    pub id: String,
    pub origin: Option<String>,
    pub overlay: bool,
    pub is_convenient: bool,
    pub payload: EffectDefinition,
}
