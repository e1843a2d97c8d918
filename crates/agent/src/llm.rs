use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use aurora_core::config::LlmConfig;
use aurora_core::domain::conversation::{ChatMessage, ChatRole};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Seam between the orchestrator and the model provider. Implementations
/// report transport problems as errors; the caller decides how a failed
/// completion surfaces to the user.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String>;
}

/// Chat-completions client for OpenAI-compatible endpoints (Groq in the
/// default configuration).
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().to_string())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("llm api key is not configured"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building llm http client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn encode_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => "tool",
                };
                let mut encoded = json!({"role": role, "content": message.content});
                if let Some(name) = &message.name {
                    encoded["name"] = Value::from(name.clone());
                }
                if let Some(tool_call_id) = &message.tool_call_id {
                    encoded["tool_call_id"] = Value::from(tool_call_id.clone());
                }
                encoded
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, messages: &[ChatMessage], format: ResponseFormat) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::encode_messages(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if format == ResponseFormat::JsonObject {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("llm request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let preview: String = detail.chars().take(200).collect();
            return Err(anyhow!("llm returned {status}: {preview}"));
        }

        let payload: Value = response.json().await.context("decoding llm response")?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(content)
    }
}
