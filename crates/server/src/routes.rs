use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use aurora_agent::Orchestrator;
use aurora_core::domain::client::ClientDatum;
use aurora_store::{SqliteSessionBackend, StoreError};

use crate::channels::{render_twiml, WhatsAppMessage};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<SqliteSessionBackend>>,
    pub model: String,
    pub payments_base_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/healthz", get(healthz))
        .route("/webhooks/telegram", post(telegram_webhook))
        .route("/webhooks/whatsapp", post(whatsapp_webhook))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub metadata: Map<String, Value>,
    #[serde(default, alias = "clientData")]
    pub clients: Vec<ClientDatum>,
}

fn default_channel() -> String {
    "web".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TelegramWebhook {
    pub chat_id: String,
    pub text: String,
    #[allow(dead_code)]
    pub username: Option<String>,
}

pub enum ApiError {
    BadRequest(&'static str),
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(source: StoreError) -> Self {
        error!(event_name = "server.store_failure", error = %source);
        Self::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "An unexpected internal error occurred.")
            }
        };
        (status, Json(json!({"detail": detail}))).into_response()
    }
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty"));
    }

    if !request.clients.is_empty() {
        state
            .orchestrator
            .merge_clients(&request.session_id, &request.clients, Some(&request.channel))
            .await?;
    }

    let outcome = state
        .orchestrator
        .handle_message(&request.session_id, &request.message, &request.channel)
        .await?;

    Ok(Json(outcome).into_response())
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.model,
        "payments_base_url": state.payments_base_url,
    }))
}

async fn telegram_webhook(
    State(state): State<AppState>,
    Json(payload): Json<TelegramWebhook>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state
        .orchestrator
        .handle_message(&payload.chat_id, &payload.text, "telegram")
        .await?;
    Ok(Json(json!({"output": outcome.output})))
}

async fn whatsapp_webhook(
    State(state): State<AppState>,
    Form(payload): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let message = WhatsAppMessage::from_twilio_payload(&payload);
    let session_id = message.session_id().to_string();

    info!(
        event_name = "whatsapp_webhook.received",
        sender = %message.sender,
        wa_id = message.wa_id.as_deref().unwrap_or_default(),
    );

    state
        .orchestrator
        .merge_clients(&session_id, &[message.build_client()], Some("whatsapp"))
        .await?;

    let text = if message.text.trim().is_empty() {
        "User sent a message with no accompanying text.".to_string()
    } else {
        message.text.clone()
    };

    let outcome = state.orchestrator.handle_message(&session_id, &text, "whatsapp").await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        render_twiml(&outcome.output),
    )
        .into_response())
}
