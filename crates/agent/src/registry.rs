use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// The action vocabulary is fixed and known ahead of time. A closed enum
/// plus the registry's construction-time check turns "tool not wired up"
/// into a startup failure instead of a mid-conversation surprise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolId {
    PolicyResearch,
    ClaimsRecommendation,
    DocumentIngest,
    TravelInsurancePurchase,
    PaymentCheckout,
    PaymentStatus,
}

impl ToolId {
    pub const ALL: [ToolId; 6] = [
        ToolId::PolicyResearch,
        ToolId::ClaimsRecommendation,
        ToolId::DocumentIngest,
        ToolId::TravelInsurancePurchase,
        ToolId::PaymentCheckout,
        ToolId::PaymentStatus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PolicyResearch => "policy_research",
            Self::ClaimsRecommendation => "claims_recommendation",
            Self::DocumentIngest => "document_ingest",
            Self::TravelInsurancePurchase => "travel_insurance_purchase",
            Self::PaymentCheckout => "payment_checkout",
            Self::PaymentStatus => "payment_status",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn invoke(&self, input: Value) -> Result<Value>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no handler registered for tool `{0}`")]
    MissingHandler(&'static str),
    #[error("tool `{0}` was registered more than once")]
    DuplicateHandler(&'static str),
}

pub struct ToolRegistry {
    tools: HashMap<ToolId, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Result<Self, RegistryError> {
        let mut registered: HashMap<ToolId, Arc<dyn Tool>> = HashMap::new();
        for tool in tools {
            let id = tool.id();
            if registered.insert(id, tool).is_some() {
                return Err(RegistryError::DuplicateHandler(id.name()));
            }
        }
        for id in ToolId::ALL {
            if !registered.contains_key(&id) {
                return Err(RegistryError::MissingHandler(id.name()));
            }
        }
        Ok(Self { tools: registered })
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        let id = ToolId::from_name(name)?;
        self.tools.get(&id).map(Arc::as_ref)
    }

    /// One line per tool for the system prompt, in declaration order.
    pub fn catalog(&self) -> String {
        ToolId::ALL
            .into_iter()
            .filter_map(|id| self.tools.get(&id))
            .map(|tool| {
                format!(
                    "- {}: {} | Schema: {}",
                    tool.id().name(),
                    tool.description(),
                    tool.input_schema()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
