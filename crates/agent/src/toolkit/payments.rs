//! Client for the auxiliary payments service that fronts the checkout
//! provider. Session creation and status lookups are separate tools so the
//! model can poll a session it created earlier.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use aurora_core::config::PaymentsConfig;

use crate::registry::{Tool, ToolId};

const CREATE_TIMEOUT: Duration = Duration::from_secs(15);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

fn default_currency() -> String {
    "sgd".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_code: String,
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

pub struct PaymentGatewayClient {
    http: reqwest::Client,
    base_url: String,
    status_url: String,
}

impl PaymentGatewayClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("building payments http client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            status_url: config.status_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<Value> {
        info!(
            event_name = "payments.create_session",
            plan_code = %request.plan_code,
            amount = request.amount,
        );

        let body = json!({
            "plan_code": request.plan_code,
            "amount": request.amount,
            "currency": request.currency,
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
            "customer_email": request.customer_email,
            "metadata": request.metadata,
        });

        let response = self
            .http
            .post(format!("{}/payments/session", self.base_url))
            .timeout(CREATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .context("payments service is unreachable")?
            .error_for_status()
            .context("payments service rejected the session request")?;

        let data: Value = response.json().await.context("decoding payments response")?;
        let session_id = data
            .get("session_id")
            .and_then(Value::as_str)
            .context("payments response is missing session_id")?;
        let checkout_url = data
            .get("checkout_url")
            .and_then(Value::as_str)
            .context("payments response is missing checkout_url")?;

        Ok(json!({
            "provider": data.get("provider").and_then(Value::as_str).unwrap_or("stripe"),
            "session_id": session_id,
            "checkout_url": checkout_url,
        }))
    }

    pub async fn fetch_status(&self, session_id: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/{session_id}", self.status_url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .context("payments service is unreachable")?;

        if response.status() == StatusCode::NOT_FOUND {
            bail!("Payment session not found");
        }

        let response =
            response.error_for_status().context("payments status lookup failed")?;
        response.json().await.context("decoding payments status response")
    }
}

pub struct PaymentCheckoutTool {
    gateway: Arc<PaymentGatewayClient>,
}

impl PaymentCheckoutTool {
    pub fn new(gateway: Arc<PaymentGatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for PaymentCheckoutTool {
    fn id(&self) -> ToolId {
        ToolId::PaymentCheckout
    }

    fn description(&self) -> &'static str {
        "Create and monitor a payment checkout session for purchasing a travel insurance plan. \
         Provide the plan_code, price, and metadata as determined by the consultation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan_code": {
                    "type": "string",
                    "description": "Use the pricing offer's productCode as the plan identifier.",
                },
                "amount": {"type": "integer", "description": "Amount in minor currency units"},
                "currency": {"type": "string", "default": "sgd"},
                "success_url": {"type": "string"},
                "cancel_url": {"type": "string"},
                "customer_email": {"type": "string"},
                "metadata": {
                    "type": "object",
                    "description": "Additional context such as quoteId, offerId, productCode, traveller info.",
                },
            },
            "required": ["plan_code", "amount", "currency", "success_url", "cancel_url"],
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let request: CheckoutRequest =
            serde_json::from_value(input).context("invalid payment_checkout input")?;
        if request.amount < 0 {
            bail!("payment amount must not be negative");
        }
        self.gateway.create_checkout_session(&request).await
    }
}

pub struct PaymentStatusTool {
    gateway: Arc<PaymentGatewayClient>,
}

impl PaymentStatusTool {
    pub fn new(gateway: Arc<PaymentGatewayClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Tool for PaymentStatusTool {
    fn id(&self) -> ToolId {
        ToolId::PaymentStatus
    }

    fn description(&self) -> &'static str {
        "Retrieve the latest status of a previously created payment session."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Checkout session identifier returned at creation",
                },
            },
            "required": ["session_id"],
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        let session_id = input
            .get("session_id")
            .and_then(Value::as_str)
            .context("payment_status requires a session_id string")?;
        self.gateway.fetch_status(session_id).await
    }
}
