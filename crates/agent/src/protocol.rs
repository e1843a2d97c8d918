//! The model's structured reply is untrusted input. Parsing never fails a
//! turn: non-JSON replies degrade to plain text, unexpected JSON shapes
//! are stringified, and the older singular `{"action": ...}` form is
//! lifted into the canonical actions list.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AssistantPayload {
    pub output: String,
    pub actions: Vec<ActionRequest>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ActionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseAnomaly {
    NonJsonReply,
    NonObjectJson,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedReply {
    pub payload: AssistantPayload,
    pub anomaly: Option<ParseAnomaly>,
}

pub fn parse_assistant_reply(reply: &str) -> ParsedReply {
    if reply.is_empty() {
        return ParsedReply { payload: AssistantPayload::default(), anomaly: None };
    }

    let parsed: Value = match serde_json::from_str(reply) {
        Ok(value) => value,
        Err(_) => {
            return ParsedReply {
                payload: AssistantPayload {
                    output: reply.to_string(),
                    actions: Vec::new(),
                },
                anomaly: Some(ParseAnomaly::NonJsonReply),
            };
        }
    };

    match parsed {
        Value::Object(map) => {
            let output = normalize_output(map.get("output"));
            let actions = extract_actions(&map);
            ParsedReply { payload: AssistantPayload { output, actions }, anomaly: None }
        }
        Value::String(text) => ParsedReply {
            payload: AssistantPayload { output: text, actions: Vec::new() },
            anomaly: Some(ParseAnomaly::NonObjectJson),
        },
        other => ParsedReply {
            payload: AssistantPayload { output: other.to_string(), actions: Vec::new() },
            anomaly: Some(ParseAnomaly::NonObjectJson),
        },
    }
}

/// Output is a string no matter what the model produced.
pub fn normalize_output(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn extract_actions(payload: &serde_json::Map<String, Value>) -> Vec<ActionRequest> {
    if let Some(Value::Array(items)) = payload.get("actions") {
        return items
            .iter()
            .filter_map(Value::as_object)
            .map(|action| ActionRequest {
                tool: action
                    .get("tool")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|tool| !tool.is_empty())
                    .map(str::to_string),
                input: action.get("input").cloned().unwrap_or_else(|| json!({})),
                tool_call_id: action
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect();
    }

    if let Some(action) = payload.get("action").and_then(Value::as_str) {
        if !action.trim().is_empty() {
            return vec![ActionRequest {
                tool: Some(action.trim().to_string()),
                input: payload.get("input").cloned().unwrap_or_else(|| json!({})),
                tool_call_id: payload
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }];
        }
    }

    Vec::new()
}

impl AssistantPayload {
    /// The transcript form of an assistant turn: always the canonical
    /// `{output, actions}` object.
    pub fn to_transcript_json(&self) -> String {
        json!({"output": self.output, "actions": self.actions}).to_string()
    }
}
