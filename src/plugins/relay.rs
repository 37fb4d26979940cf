//! Authority relay.
//!
//! Every mutating request is a [`RelayRequest`]. The authoritative session runs
//! it in-process; any other session publishes it inside an [`Envelope`] and
//! every receiver except the authority discards it. The channel is
//! at-least-once, so the authority remembers recent request ids and drops
//! redeliveries.

use crate::core::error::EffectsError;
use crate::core::model::EffectDefinition;
use crate::core::session::EffectSession;
use crate::core::time;
use crate::plugins::toggle;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEffectData {
    pub effect_data: EffectDefinition,
    pub target_uuid: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub overlay: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEffectData {
    /// Effect id or display name.
    pub effect_id: String,
    pub target_uuid: String,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleEffectData {
    pub effect_name: String,
    pub target_uuids: Vec<String>,
    #[serde(default)]
    pub overlay: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEffectData {
    pub target_uuid: String,
    pub instance_id: String,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", content = "data", rename_all = "camelCase")]
pub enum RelayRequest {
    AddEffect(AddEffectData),
    RemoveEffect(RemoveEffectData),
    /// Kept for senders that still ask the authority to decide add vs. remove.
    ToggleEffect(ToggleEffectData),
    UpdateEffect(UpdateEffectData),
}

pub const KNOWN_REQUESTS: [&str; 4] = ["addEffect", "removeEffect", "toggleEffect", "updateEffect"];

impl RelayRequest {
    pub fn tag(&self) -> &'static str {
        match self {
            RelayRequest::AddEffect(_) => "addEffect",
            RelayRequest::RemoveEffect(_) => "removeEffect",
            RelayRequest::ToggleEffect(_) => "toggleEffect",
            RelayRequest::UpdateEffect(_) => "updateEffect",
        }
    }

    /// Decode a wire message, naming the request tag when it is not one of ours.
    pub fn decode(message: &JsonValue) -> Result<Self, EffectsError> {
        let tag = message
            .get("request")
            .and_then(JsonValue::as_str)
            .unwrap_or("<missing>");
        if !KNOWN_REQUESTS.contains(&tag) {
            return Err(EffectsError::UnknownRequest(tag.to_string()));
        }
        Ok(serde_json::from_value(message.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub request_id: String,
    pub sender: String,
    pub ts: String,
    /// Raw so receivers can reject unknown requests themselves.
    pub message: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    Executed,
    Forwarded { request_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Executed,
    /// This session is not the authority.
    Discarded,
    /// Already executed under this request id.
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub executed: usize,
    pub discarded: usize,
    pub duplicates: usize,
    /// Local failures; never sent back to the requester.
    pub errors: Vec<String>,
    /// The inbox was left untouched because this authority has not initialized.
    pub held: bool,
}

struct SeenRequests {
    order: VecDeque<String>,
    ids: FxHashSet<String>,
    capacity: usize,
}

impl SeenRequests {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.capacity > 0 && self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

pub struct Relay {
    seen: Mutex<SeenRequests>,
}

impl Relay {
    pub fn new(dedupe_capacity: usize) -> Self {
        Self {
            seen: Mutex::new(SeenRequests {
                order: VecDeque::new(),
                ids: FxHashSet::default(),
                capacity: dedupe_capacity,
            }),
        }
    }

    /// Run locally as authority, or forward. With no authority connected this
    /// fails before anything is sent or written.
    pub fn emit(
        &self,
        session: &EffectSession,
        request: RelayRequest,
    ) -> Result<EmitOutcome, EffectsError> {
        let ready = session.ready_to_execute();
        if session.authority().is_authority() {
            if !ready {
                return Err(EffectsError::AuthorityNotInitialized(
                    request.tag().to_string(),
                ));
            }
            execute(session, request)?;
            return Ok(EmitOutcome::Executed);
        }
        if !session.authority().authority_available() {
            return Err(EffectsError::AuthorityAbsent(request.tag().to_string()));
        }
        let envelope = Envelope {
            request_id: time::new_id(),
            sender: session.id().to_string(),
            ts: time::now_epoch_z(),
            message: serde_json::to_value(&request)?,
        };
        session.channel().publish(serde_json::to_value(&envelope)?)?;
        tracing::debug!(request = request.tag(), request_id = %envelope.request_id, "forwarded to authority");
        Ok(EmitOutcome::Forwarded {
            request_id: envelope.request_id,
        })
    }

    fn seen(&self) -> Result<std::sync::MutexGuard<'_, SeenRequests>, EffectsError> {
        self.seen
            .lock()
            .map_err(|_| EffectsError::ValidationError("relay lock poisoned".to_string()))
    }

    /// Handle one delivered payload. The request id is remembered only once
    /// execution succeeds, so a redelivery after a failure runs again.
    pub fn receive(
        &self,
        session: &EffectSession,
        payload: JsonValue,
    ) -> Result<ReceiveOutcome, EffectsError> {
        let ready = session.ready_to_execute();
        if !session.authority().is_authority() {
            return Ok(ReceiveOutcome::Discarded);
        }
        let envelope: Envelope = serde_json::from_value(payload)?;
        if self.seen()?.contains(&envelope.request_id) {
            tracing::debug!(request_id = %envelope.request_id, "redelivered request dropped");
            return Ok(ReceiveOutcome::Duplicate);
        }
        let request = RelayRequest::decode(&envelope.message)?;
        if !ready {
            return Err(EffectsError::AuthorityNotInitialized(
                request.tag().to_string(),
            ));
        }
        tracing::info!(
            request = request.tag(),
            request_id = %envelope.request_id,
            sender = %envelope.sender,
            "executing relayed request"
        );
        execute(session, request)?;
        self.seen()?.insert(&envelope.request_id);
        Ok(ReceiveOutcome::Executed)
    }

    /// Drain the session's inbox and handle each payload in arrival order.
    /// One failure does not stop the rest. An authority that has not
    /// initialized leaves its inbox queued until it has.
    pub fn pump(&self, session: &EffectSession) -> Result<PumpReport, EffectsError> {
        let mut report = PumpReport::default();
        if session.authority().is_authority() && !session.ready_to_execute() {
            tracing::warn!(session = %session.id(), "authority not initialized; relayed requests held");
            report.held = true;
            return Ok(report);
        }
        for payload in session.channel().drain()? {
            match self.receive(session, payload) {
                Ok(ReceiveOutcome::Executed) => report.executed += 1,
                Ok(ReceiveOutcome::Discarded) => report.discarded += 1,
                Ok(ReceiveOutcome::Duplicate) => report.duplicates += 1,
                Err(err) => {
                    tracing::error!(error = %err, "relayed request failed");
                    report.errors.push(err.to_string());
                }
            }
        }
        Ok(report)
    }
}

/// Authority-side dispatch.
pub fn execute(session: &EffectSession, request: RelayRequest) -> Result<(), EffectsError> {
    match request {
        RelayRequest::AddEffect(data) => toggle::execute_add(session, data).map(|_| ()),
        RelayRequest::RemoveEffect(data) => toggle::execute_remove(session, data).map(|_| ()),
        RelayRequest::ToggleEffect(data) => toggle::execute_toggle(session, data),
        RelayRequest::UpdateEffect(data) => toggle::execute_update(session, data),
    }
}
