//! Thin channel payload parsing. Channels only ever produce a text
//! message plus a minimal profile stub; everything else is the
//! orchestrator's job.

use std::collections::HashMap;

use serde_json::{json, Map};

use aurora_core::domain::client::{ClientDatum, PersonalInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WhatsAppMessage {
    pub sender: String,
    pub text: String,
    pub wa_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl WhatsAppMessage {
    pub fn from_twilio_payload(payload: &HashMap<String, String>) -> Self {
        Self {
            sender: payload.get("From").cloned().unwrap_or_default(),
            text: payload.get("Body").cloned().unwrap_or_default(),
            wa_id: payload.get("WaId").cloned(),
            metadata: payload
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "From" | "Body" | "WaId"))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.wa_id.as_deref().filter(|id| !id.is_empty()).unwrap_or(&self.sender)
    }

    /// Profile stub carrying whatever identity the webhook exposes; the
    /// merge algorithm reconciles it with anything already on file.
    pub fn build_client(&self) -> ClientDatum {
        let profile_name = self
            .metadata
            .get("ProfileName")
            .or_else(|| self.metadata.get("profile_name"))
            .cloned();

        let mut extra = Map::new();
        extra.insert("whatsapp".to_string(), json!({"metadata": self.metadata}));

        ClientDatum {
            client_id: Some(self.session_id().to_string()),
            source: Some("whatsapp".to_string()),
            personal_info: PersonalInfo {
                name: profile_name,
                phone_number: Some(self.sender.clone()).filter(|s| !s.is_empty()),
                ..PersonalInfo::default()
            },
            extra,
            ..ClientDatum::default()
        }
    }
}

pub fn render_twiml(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;");
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{escaped}</Message></Response>"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{render_twiml, WhatsAppMessage};

    fn twilio_payload() -> HashMap<String, String> {
        HashMap::from([
            ("From".to_string(), "whatsapp:+6591234567".to_string()),
            ("Body".to_string(), "I need cover for Bali".to_string()),
            ("WaId".to_string(), "6591234567".to_string()),
            ("ProfileName".to_string(), "Javier".to_string()),
        ])
    }

    #[test]
    fn twilio_payload_maps_onto_message_fields() {
        let message = WhatsAppMessage::from_twilio_payload(&twilio_payload());
        assert_eq!(message.sender, "whatsapp:+6591234567");
        assert_eq!(message.text, "I need cover for Bali");
        assert_eq!(message.session_id(), "6591234567");
        assert_eq!(message.metadata.get("ProfileName").map(String::as_str), Some("Javier"));
        assert!(!message.metadata.contains_key("Body"));
    }

    #[test]
    fn session_id_falls_back_to_sender() {
        let mut payload = twilio_payload();
        payload.remove("WaId");
        let message = WhatsAppMessage::from_twilio_payload(&payload);
        assert_eq!(message.session_id(), "whatsapp:+6591234567");
    }

    #[test]
    fn client_stub_carries_name_phone_and_channel() {
        let message = WhatsAppMessage::from_twilio_payload(&twilio_payload());
        let client = message.build_client();

        assert_eq!(client.client_id.as_deref(), Some("6591234567"));
        assert_eq!(client.source.as_deref(), Some("whatsapp"));
        assert_eq!(client.personal_info.name.as_deref(), Some("Javier"));
        assert_eq!(client.personal_info.phone_number.as_deref(), Some("whatsapp:+6591234567"));
        assert!(client.extra.contains_key("whatsapp"));
    }

    #[test]
    fn twiml_escapes_markup() {
        let twiml = render_twiml("Premium < SGD 50 & \"cheap\"");
        assert!(twiml.contains("Premium &lt; SGD 50 &amp; &quot;cheap&quot;"));
        assert!(twiml.starts_with("<?xml"));
    }
}
