use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One transcript entry. Tool messages carry the tool name and the call id
/// they answer so the model can line results up with its own requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), name: None, tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), name: None, tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), name: None, tool_call_id: None }
    }

    pub fn tool(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, ChatRole};

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage::tool("claims_recommendation", "toolcall-1", "{}");
        let encoded = serde_json::to_value(&message).expect("serialize");
        assert_eq!(encoded["role"], "tool");
        assert_eq!(encoded["name"], "claims_recommendation");
        assert_eq!(encoded["tool_call_id"], "toolcall-1");
    }

    #[test]
    fn plain_messages_omit_tool_fields() {
        let encoded =
            serde_json::to_value(ChatMessage::user("hi")).expect("serialize user message");
        assert_eq!(encoded["role"], "user");
        assert!(encoded.get("name").is_none());
        assert!(encoded.get("tool_call_id").is_none());
        assert_eq!(ChatRole::Assistant, ChatRole::Assistant);
    }
}
