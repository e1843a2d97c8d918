//! Precondition check gating the payment step. Evaluated fresh on every
//! orchestration round; never cached.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::client::{build_verification_fields, ClientDatum, VerificationStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentReadiness {
    MissingClients,
    MissingFields {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        missing: Vec<String>,
    },
    Unverified {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        fields: Map<String, Value>,
    },
    Ready {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },
}

impl PaymentReadiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Wire-format status tag; safe for logs (no traveller data).
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::MissingClients => "missing_clients",
            Self::MissingFields { .. } => "missing_fields",
            Self::Unverified { .. } => "unverified",
            Self::Ready { .. } => "ready",
        }
    }
}

/// Scans the roster in order and stops at the first blocking client.
/// Reaching the end means every profile is complete and confirmed.
pub fn evaluate_readiness(clients: &[ClientDatum]) -> PaymentReadiness {
    if clients.is_empty() {
        return PaymentReadiness::MissingClients;
    }

    for client in clients {
        let missing = client.required_missing_fields();
        if !missing.is_empty() {
            return PaymentReadiness::MissingFields {
                client_id: client.client_id.clone(),
                missing: missing.into_iter().map(str::to_string).collect(),
            };
        }

        if client.verification.status != VerificationStatus::Confirmed {
            let fields = if client.verification.fields.is_empty() {
                build_verification_fields(client)
            } else {
                client.verification.fields.clone()
            };
            return PaymentReadiness::Unverified { client_id: client.client_id.clone(), fields };
        }
    }

    PaymentReadiness::Ready { client_id: clients[0].client_id.clone() }
}
