use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use aurora_core::domain::client::{ClientDatum, VerificationStatus};
use aurora_core::domain::conversation::ChatMessage;
use aurora_core::enrichment::apply_payment_context;
use aurora_core::merge::merge_client_records;
use aurora_core::readiness::{evaluate_readiness, PaymentReadiness};

use crate::backends::{SessionBackend, StoreError};

/// Everything a session persists: the transcript, the traveller roster,
/// and the last result of each tool.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub messages: Vec<ChatMessage>,
    pub clients: Vec<ClientDatum>,
    pub tool_results: Map<String, Value>,
}

/// Session-level operations over a pluggable backend. Each operation is a
/// read-modify-write of the whole snapshot; concurrent writers to the same
/// session id are last-writer-wins (known gap, see DESIGN.md).
pub struct SessionStore<B> {
    backend: B,
}

impl<B: SessionBackend> SessionStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionSnapshot, StoreError> {
        Ok(self.backend.load(session_id).await?.unwrap_or_default())
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        message: ChatMessage,
    ) -> Result<(), StoreError> {
        let mut session = self.get(session_id).await?;
        session.messages.push(message);
        self.backend.store(session_id, &session).await
    }

    pub async fn set_tool_result(
        &self,
        session_id: &str,
        tool_name: &str,
        result: Value,
    ) -> Result<(), StoreError> {
        let mut session = self.get(session_id).await?;
        session.tool_results.insert(tool_name.to_string(), result);
        self.backend.store(session_id, &session).await
    }

    pub async fn get_tool_result(
        &self,
        session_id: &str,
        tool_name: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.get(session_id).await?.tool_results.get(tool_name).cloned())
    }

    pub async fn get_clients(&self, session_id: &str) -> Result<Vec<ClientDatum>, StoreError> {
        Ok(self.get(session_id).await?.clients)
    }

    /// Merges incoming traveller records into the roster, stamping a
    /// default source on records that arrived without one.
    pub async fn merge_clients(
        &self,
        session_id: &str,
        clients: &[ClientDatum],
        source: Option<&str>,
    ) -> Result<Vec<ClientDatum>, StoreError> {
        if clients.is_empty() {
            return self.get_clients(session_id).await;
        }

        let normalized: Vec<ClientDatum> = clients
            .iter()
            .map(|client| match (&client.source, source) {
                (None, Some(default_source)) => {
                    let mut stamped = client.clone();
                    stamped.source = Some(default_source.to_string());
                    stamped
                }
                _ => client.clone(),
            })
            .collect();

        let mut session = self.get(session_id).await?;
        session.clients = merge_client_records(&session.clients, &normalized);
        let merged = session.clients.clone();
        self.backend.store(session_id, &session).await?;
        Ok(merged)
    }

    /// Backfills the first incomplete profile from a checkout payload.
    /// Returns whether anything changed.
    pub async fn apply_payment_context(
        &self,
        session_id: &str,
        payload: &Value,
    ) -> Result<bool, StoreError> {
        let mut session = self.get(session_id).await?;
        match apply_payment_context(&session.clients, payload) {
            Some(updated) => {
                session.clients = updated;
                self.backend.store(session_id, &session).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn evaluate_payment_readiness(
        &self,
        session_id: &str,
    ) -> Result<PaymentReadiness, StoreError> {
        Ok(evaluate_readiness(&self.get_clients(session_id).await?))
    }

    /// Marks the matching profiles pending confirmation and records the
    /// snapshot of values the traveller was shown.
    pub async fn request_verification(
        &self,
        session_id: &str,
        client_id: Option<&str>,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut session = self.get(session_id).await?;
        let mut updated = false;
        for client in &mut session.clients {
            if !matches_client(client, client_id) {
                continue;
            }
            client.verification.status = VerificationStatus::Pending;
            client.verification.fields = fields.clone();
            client.verification.requested_at = Some(Utc::now().to_rfc3339());
            client.verification.confirmed_at = None;
            updated = true;
        }
        if updated {
            self.backend.store(session_id, &session).await?;
        }
        Ok(())
    }

    /// Treats a short affirmative user message as confirmation of every
    /// pending profile. Questions never count as confirmations.
    pub async fn try_mark_verification(
        &self,
        session_id: &str,
        user_message: &str,
    ) -> Result<bool, StoreError> {
        if !is_confirmation_message(user_message) {
            return Ok(false);
        }

        let mut session = self.get(session_id).await?;
        let mut updated = false;
        for client in &mut session.clients {
            if client.verification.status == VerificationStatus::Pending {
                client.verification.status = VerificationStatus::Confirmed;
                client.verification.confirmed_at = Some(Utc::now().to_rfc3339());
                updated = true;
            }
        }
        if updated {
            self.backend.store(session_id, &session).await?;
        }
        Ok(updated)
    }

    pub async fn clear(&self, session_id: &str) -> Result<(), StoreError> {
        self.backend.clear(session_id).await
    }
}

fn matches_client(client: &ClientDatum, client_id: Option<&str>) -> bool {
    let Some(wanted) = client_id else {
        return true;
    };
    if client.client_id.as_deref() == Some(wanted) {
        return true;
    }
    client.personal_info.passport_number.as_deref() == Some(wanted)
}

const CONFIRMATION_PHRASES: &[&str] = &[
    "confirm",
    "confirmed",
    "looks good",
    "correct",
    "go ahead",
    "approve",
    "proceed",
    "verified",
];

const ACCEPTED_LEADING_TOKENS: &[&str] = &["yes", "yup", "yeah", "sure", "ok", "okay"];

fn is_confirmation_message(user_message: &str) -> bool {
    let text = user_message.trim().to_lowercase();
    if text.is_empty() || text.contains('?') {
        return false;
    }
    if CONFIRMATION_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        return true;
    }
    text.split_whitespace()
        .next()
        .map(|first| ACCEPTED_LEADING_TOKENS.contains(&first))
        .unwrap_or(false)
}
