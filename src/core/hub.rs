//! Host session directory and publish/subscribe channel.
//!
//! The core only sees two traits: [`Authority`] answers "am I the authority?"
//! and "is any authority connected?", [`Channel`] publishes to and drains from
//! the shared channel. [`LocalHub`] is the in-process host binding: it tracks
//! connected sessions, guarantees at most one of them holds authority, and
//! delivers every published payload, in order, to every other session's inbox.

use crate::core::error::EffectsError;
use crate::core::time;
use serde_json::Value as JsonValue;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

pub trait Authority: Send + Sync {
    /// Whether this session may mutate shared records.
    fn is_authority(&self) -> bool;
    /// Whether any connected session (this one included) holds authority.
    fn authority_available(&self) -> bool;
}

pub trait Channel: Send + Sync {
    /// Deliver a payload to every other connected session. Fire and forget.
    fn publish(&self, payload: JsonValue) -> Result<(), EffectsError>;
    /// Everything delivered to this session since the last drain, in order.
    fn drain(&self) -> Result<Vec<JsonValue>, EffectsError>;
}

struct Member {
    id: String,
    name: String,
    authority: bool,
    inbox: Sender<JsonValue>,
}

#[derive(Default)]
pub struct LocalHub {
    members: Mutex<Vec<Member>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: String,
    pub name: String,
    pub authority: bool,
}

fn poisoned() -> EffectsError {
    EffectsError::ValidationError("hub lock poisoned".to_string())
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the hub. At most one authoritative member may be connected.
    pub fn connect(
        self: &Arc<Self>,
        name: &str,
        authority: bool,
    ) -> Result<Arc<HubEndpoint>, EffectsError> {
        let mut members = self.members.lock().map_err(|_| poisoned())?;
        if authority && members.iter().any(|m| m.authority) {
            return Err(EffectsError::ValidationError(format!(
                "'{}' cannot connect as authority: another authoritative session is connected",
                name
            )));
        }
        let (tx, rx) = mpsc::channel();
        let id = time::new_id();
        members.push(Member {
            id: id.clone(),
            name: name.to_string(),
            authority,
            inbox: tx,
        });
        tracing::info!(session = %id, name, authority, "session connected");
        Ok(Arc::new(HubEndpoint {
            hub: Arc::clone(self),
            id,
            name: name.to_string(),
            inbox: Mutex::new(rx),
        }))
    }

    /// Hand authority to one member, demoting whoever held it.
    pub fn promote(&self, session_id: &str) -> Result<(), EffectsError> {
        let mut members = self.members.lock().map_err(|_| poisoned())?;
        if !members.iter().any(|m| m.id == session_id) {
            return Err(EffectsError::NotFound(format!("session {}", session_id)));
        }
        for m in members.iter_mut() {
            m.authority = m.id == session_id;
        }
        tracing::info!(session = session_id, "authority transferred");
        Ok(())
    }

    pub fn members(&self) -> Result<Vec<MemberInfo>, EffectsError> {
        let members = self.members.lock().map_err(|_| poisoned())?;
        Ok(members
            .iter()
            .map(|m| MemberInfo {
                id: m.id.clone(),
                name: m.name.clone(),
                authority: m.authority,
            })
            .collect())
    }

    fn disconnect(&self, session_id: &str) {
        if let Ok(mut members) = self.members.lock() {
            members.retain(|m| m.id != session_id);
            tracing::info!(session = session_id, "session disconnected");
        }
    }

    fn is_authority(&self, session_id: &str) -> bool {
        self.members
            .lock()
            .map(|members| members.iter().any(|m| m.id == session_id && m.authority))
            .unwrap_or(false)
    }

    fn authority_available(&self) -> bool {
        self.members
            .lock()
            .map(|members| members.iter().any(|m| m.authority))
            .unwrap_or(false)
    }

    fn broadcast(&self, sender: &str, payload: JsonValue) -> Result<usize, EffectsError> {
        let members = self.members.lock().map_err(|_| poisoned())?;
        let mut delivered = 0;
        for m in members.iter().filter(|m| m.id != sender) {
            // A member whose receiver is gone is mid-disconnect.
            if m.inbox.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}

/// One session's connection to the hub. Disconnects when dropped.
pub struct HubEndpoint {
    hub: Arc<LocalHub>,
    id: String,
    name: String,
    inbox: Mutex<Receiver<JsonValue>>,
}

impl HubEndpoint {
    pub fn session_id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hub(&self) -> &Arc<LocalHub> {
        &self.hub
    }
}

impl Authority for HubEndpoint {
    fn is_authority(&self) -> bool {
        self.hub.is_authority(&self.id)
    }

    fn authority_available(&self) -> bool {
        self.hub.authority_available()
    }
}

impl Channel for HubEndpoint {
    fn publish(&self, payload: JsonValue) -> Result<(), EffectsError> {
        let delivered = self.hub.broadcast(&self.id, payload)?;
        tracing::debug!(session = %self.id, delivered, "published");
        Ok(())
    }

    fn drain(&self) -> Result<Vec<JsonValue>, EffectsError> {
        let inbox = self.inbox.lock().map_err(|_| poisoned())?;
        Ok(inbox.try_iter().collect())
    }
}

impl Drop for HubEndpoint {
    fn drop(&mut self) {
        self.hub.disconnect(&self.id);
    }
}
